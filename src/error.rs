use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Session expired or invalid, please log in again")]
    Unauthorized,

    #[error("Administrator access required")]
    Forbidden,

    #[error("Invalid draw: {}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    Session(#[from] rusqlite::Error),
}

impl ApiError {
    /// Transport failures and server-side errors may succeed on a later try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http(e) => !e.is_decode() && !e.is_builder(),
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_errors() {
        let err = ApiError::Validation(vec![
            ValidationError::InvalidDrawNumber,
            ValidationError::PowerballOutOfRange,
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid draw: Draw number must be a positive integer; \
             Powerball must be a number between 1 and 26"
        );
    }

    #[test]
    fn test_retryable_statuses() {
        let server = ApiError::Status {
            status: 503,
            message: "down".to_string(),
        };
        let client = ApiError::Status {
            status: 400,
            message: "bad".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!ApiError::Unauthorized.is_retryable());
    }
}
