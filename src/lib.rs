// Client core for the Powerball Analyzer API
pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod import;
pub mod normalize;
pub mod session;
pub mod types;
pub mod upload;
pub mod use_cases;
pub mod utils;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use config::Config;
pub use error::ApiError;
pub use import::{ImportError, parse_file_content};
pub use normalize::*;
pub use session::{Session, SessionStore};
pub use types::*;
pub use upload::{BatchUploader, UploadProgress, UploadReport};
pub use validation::*;
