use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

use crate::normalize::{POWERBALL_MAX, WHITE_BALL_MAX};

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid ISO date pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Draw number must be a positive integer")]
    InvalidDrawNumber,

    #[error("Draw date is required")]
    MissingDrawDate,

    #[error("Draw date must be in YYYY-MM-DD format")]
    InvalidDrawDateFormat,

    #[error("Exactly 5 white balls are required (got {count})")]
    WrongWhiteBallCount { count: usize },

    #[error("White ball {position} must be a number between 1 and 69")]
    WhiteBallOutOfRange { position: usize },

    #[error("White balls must be unique")]
    DuplicateWhiteBalls,

    #[error("Powerball must be a number between 1 and 26")]
    PowerballOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawValidation {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl DrawValidation {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// The one validator for draw input. Form fields arrive as text, so every
/// parameter is taken as a string; each check runs regardless of the others.
pub fn validate_draw_parameters<S: AsRef<str>>(
    draw_number: &str,
    draw_date: &str,
    white_balls: &[S],
    powerball: &str,
) -> DrawValidation {
    let mut errors = Vec::new();

    if !matches!(parse_integer(draw_number), Some(n) if n > 0) {
        errors.push(ValidationError::InvalidDrawNumber);
    }

    let date = draw_date.trim();
    if date.is_empty() {
        errors.push(ValidationError::MissingDrawDate);
    } else if !ISO_DATE.is_match(date) {
        errors.push(ValidationError::InvalidDrawDateFormat);
    }

    check_numbers(white_balls, powerball, &mut errors);

    DrawValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Checks a ticket (five white balls and a powerball) with the same rules
/// the draw validator applies to those fields.
pub fn validate_ticket<S: AsRef<str>>(white_balls: &[S], powerball: &str) -> DrawValidation {
    let mut errors = Vec::new();
    check_numbers(white_balls, powerball, &mut errors);
    DrawValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

fn check_numbers<S: AsRef<str>>(
    white_balls: &[S],
    powerball: &str,
    errors: &mut Vec<ValidationError>,
) {
    if white_balls.len() != 5 {
        errors.push(ValidationError::WrongWhiteBallCount {
            count: white_balls.len(),
        });
    }

    let mut parsed = Vec::with_capacity(white_balls.len());
    for (i, ball) in white_balls.iter().enumerate() {
        match parse_integer(ball.as_ref()) {
            Some(n) if (1..=WHITE_BALL_MAX as i64).contains(&n) => parsed.push(n),
            Some(n) => {
                parsed.push(n);
                errors.push(ValidationError::WhiteBallOutOfRange { position: i + 1 });
            }
            None => errors.push(ValidationError::WhiteBallOutOfRange { position: i + 1 }),
        }
    }
    if parsed.iter().collect::<HashSet<_>>().len() != parsed.len() {
        errors.push(ValidationError::DuplicateWhiteBalls);
    }

    if !matches!(parse_integer(powerball), Some(n) if (1..=POWERBALL_MAX as i64).contains(&n)) {
        errors.push(ValidationError::PowerballOutOfRange);
    }
}

/// Convenience wrapper for already-typed numbers.
pub fn validate_draw(
    draw_number: u32,
    draw_date: &str,
    white_balls: &[u8; 5],
    powerball: u8,
) -> DrawValidation {
    let balls: Vec<String> = white_balls.iter().map(u8::to_string).collect();
    validate_draw_parameters(
        &draw_number.to_string(),
        draw_date,
        balls.as_slice(),
        &powerball.to_string(),
    )
}

fn parse_integer(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}
