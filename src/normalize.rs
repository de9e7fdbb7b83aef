//! Coercion of loosely-typed number fields coming back from the API.
//!
//! The backend has returned white balls as native arrays, PostgreSQL array
//! literals (`"{1,2,3,4,5}"`), JSON array strings, plain delimited strings
//! and single values. Nothing in this module fails: malformed input degrades
//! to a fixed fallback and is logged at debug level.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

pub const WHITE_BALL_MAX: u8 = 69;
pub const POWERBALL_MAX: u8 = 26;
pub const FALLBACK_WHITE_BALLS: [u8; 5] = [1, 2, 3, 4, 5];
pub const FALLBACK_POWERBALL: u8 = 1;

/// Every shape a ball field has been observed to take on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum BallsInput<'a> {
    Array(&'a [Value]),
    /// Inner text of a PostgreSQL array literal `{...}`.
    Braced(&'a str),
    /// Inner text of a JSON array string `[...]`.
    Bracketed(&'a str),
    /// Comma and/or whitespace separated string.
    Delimited(&'a str),
    Number(f64),
    Token(&'a str),
    Missing,
    Unsupported,
}

impl<'a> BallsInput<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Null => BallsInput::Missing,
            Value::Array(items) => BallsInput::Array(items),
            Value::Number(n) => BallsInput::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::classify_str(s),
            Value::Bool(_) | Value::Object(_) => BallsInput::Unsupported,
        }
    }

    fn classify_str(s: &'a str) -> Self {
        let t = s.trim();
        if t.is_empty() {
            return BallsInput::Missing;
        }
        if let Some(inner) = t.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            return BallsInput::Braced(inner);
        }
        if let Some(inner) = t.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return BallsInput::Bracketed(inner);
        }
        if t.contains(',') || t.contains(char::is_whitespace) {
            return BallsInput::Delimited(t);
        }
        BallsInput::Token(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedBalls {
    pub balls: [u8; 5],
    /// True when filler values were appended; such balls are for display only.
    pub padded: bool,
}

pub fn normalize_white_balls(input: &Value) -> [u8; 5] {
    normalize_white_balls_checked(input).balls
}

pub fn normalize_white_balls_checked(input: &Value) -> NormalizedBalls {
    let collected: Option<Vec<u8>> = match BallsInput::classify(input) {
        BallsInput::Array(items) => Some(
            items
                .iter()
                .filter_map(element_as_number)
                .filter_map(white_ball)
                .collect(),
        ),
        BallsInput::Braced(inner) | BallsInput::Bracketed(inner) | BallsInput::Delimited(inner) => {
            Some(
                tokens(inner)
                    .filter_map(parse_number_token)
                    .filter_map(white_ball)
                    .collect(),
            )
        }
        BallsInput::Number(n) => Some(white_ball(n).into_iter().collect()),
        BallsInput::Token(t) => {
            Some(parse_number_token(t).and_then(white_ball).into_iter().collect())
        }
        BallsInput::Missing | BallsInput::Unsupported => None,
    };

    let Some(mut values) = collected else {
        debug!(?input, "white balls unparseable, using fallback");
        return NormalizedBalls {
            balls: FALLBACK_WHITE_BALLS,
            padded: true,
        };
    };

    values.truncate(5);
    let padded = values.len() < 5;
    while values.len() < 5 {
        let filler = values.len() as u8 + 1;
        values.push(filler);
    }
    if padded {
        debug!(?input, ?values, "white balls padded with sequential filler");
    }

    let mut balls = [0u8; 5];
    balls.copy_from_slice(&values);
    NormalizedBalls { balls, padded }
}

/// Out-of-range values are clamped into [1,26], never rejected.
pub fn normalize_powerball(input: &Value) -> u8 {
    match BallsInput::classify(input) {
        BallsInput::Array(items) => items
            .first()
            .map(normalize_powerball)
            .unwrap_or(FALLBACK_POWERBALL),
        BallsInput::Braced(inner) | BallsInput::Bracketed(inner) | BallsInput::Delimited(inner) => {
            tokens(inner)
                .next()
                .and_then(parse_number_token)
                .map(clamp_powerball)
                .unwrap_or(FALLBACK_POWERBALL)
        }
        BallsInput::Number(n) => clamp_powerball(n),
        BallsInput::Token(t) => parse_number_token(t).map(clamp_powerball).unwrap_or_else(|| {
            debug!(token = t, "powerball unparseable, using fallback");
            FALLBACK_POWERBALL
        }),
        BallsInput::Missing | BallsInput::Unsupported => FALLBACK_POWERBALL,
    }
}

/// Numbers pass through; strings are read up to the first character that
/// cannot continue a decimal literal, so `"1,234.5"` reads as `1`. Anything
/// else is `0`.
pub fn safely_parse_number(input: &Value) -> f64 {
    let n = match input {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_float_prefix(s).unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

pub fn format_currency(amount: &Value) -> String {
    format_usd(safely_parse_number(amount))
}

pub fn format_usd(amount: f64) -> String {
    let amount = if amount.is_finite() { amount } else { 0.0 };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };

    match cents % 100 {
        0 => format!("{}${}", sign, whole),
        frac => format!("{}${}.{:02}", sign, whole, frac),
    }
}

/// Reduces a wire date to `YYYY-MM-DD` when one can be recognised; any other
/// text is returned trimmed.
pub fn normalize_draw_date(input: &Value) -> String {
    let Value::String(s) = input else {
        return String::new();
    };
    let s = s.trim();

    if let Some(head) = s.get(..10) {
        if NaiveDate::parse_from_str(head, "%Y-%m-%d").is_ok() {
            return head.to_string();
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt.date_naive().format("%Y-%m-%d").to_string();
    }
    s.to_string()
}

/// Confidence in [0,100]. Fractions in (0,1] are scaled up first.
pub fn normalize_confidence(input: &Value) -> f64 {
    let n = safely_parse_number(input);
    let scaled = if n > 0.0 && n <= 1.0 { n * 100.0 } else { n };
    scaled.clamp(0.0, 100.0)
}

pub fn deserialize_lenient_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn parse_number_token(token: &str) -> Option<f64> {
    let t = token.trim().trim_matches('"').trim_matches('\'').trim();
    if let Ok(n) = t.parse::<i64>() {
        return Some(n as f64);
    }
    t.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn element_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number_token(s),
        _ => None,
    }
}

fn white_ball(n: f64) -> Option<u8> {
    if !n.is_finite() {
        return None;
    }
    let t = n.trunc();
    (1.0..=WHITE_BALL_MAX as f64).contains(&t).then_some(t as u8)
}

fn clamp_powerball(n: f64) -> u8 {
    if !n.is_finite() {
        return FALLBACK_POWERBALL;
    }
    n.trunc().clamp(1.0, POWERBALL_MAX as f64) as u8
}

fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok()
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_arrays_are_identity() {
        let samples: [[u8; 5]; 4] = [
            [1, 2, 3, 4, 5],
            [69, 68, 67, 66, 65],
            [15, 3, 44, 9, 27],
            [7, 60, 1, 33, 18],
        ];
        for sample in samples {
            assert_eq!(normalize_white_balls(&json!(sample)), sample);
        }
    }

    #[test]
    fn test_postgres_array_literal() {
        assert_eq!(normalize_white_balls(&json!("{15,44,63,66,69}")), [15, 44, 63, 66, 69]);
    }

    #[test]
    fn test_json_array_string() {
        assert_eq!(normalize_white_balls(&json!("[3, 14, 15, 26, 53]")), [3, 14, 15, 26, 53]);
        assert_eq!(
            normalize_white_balls(&json!(r#"["3","14","15","26","53"]"#)),
            [3, 14, 15, 26, 53]
        );
    }

    #[test]
    fn test_delimited_strings() {
        assert_eq!(normalize_white_balls(&json!("10, 20, 30, 40, 50")), [10, 20, 30, 40, 50]);
        assert_eq!(normalize_white_balls(&json!("10 20 30 40 50")), [10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_missing_input_uses_fallback() {
        assert_eq!(normalize_white_balls(&Value::Null), [1, 2, 3, 4, 5]);
        assert_eq!(normalize_white_balls(&json!("")), [1, 2, 3, 4, 5]);
        assert_eq!(normalize_white_balls(&json!(true)), [1, 2, 3, 4, 5]);
        assert!(normalize_white_balls_checked(&Value::Null).padded);
    }

    #[test]
    fn test_array_elements_are_coerced_and_filtered() {
        let input = json!(["12", 0, "abc", 70, 33, 44, 55, 66, 8]);
        assert_eq!(normalize_white_balls(&input), [12, 33, 44, 55, 66]);
    }

    #[test]
    fn test_short_input_is_padded_sequentially() {
        let result = normalize_white_balls_checked(&json!([10, 20]));
        assert_eq!(result.balls, [10, 20, 3, 4, 5]);
        assert!(result.padded);

        assert_eq!(normalize_white_balls(&json!(42)), [42, 2, 3, 4, 5]);
        assert!(!normalize_white_balls_checked(&json!([1, 2, 3, 4, 5])).padded);
    }

    #[test]
    fn test_powerball_clamps() {
        assert_eq!(normalize_powerball(&json!(100)), 26);
        assert_eq!(normalize_powerball(&json!(0)), 1);
        assert_eq!(normalize_powerball(&json!(-4)), 1);
        assert_eq!(normalize_powerball(&json!("7")), 7);
        assert_eq!(normalize_powerball(&json!("99")), 26);
    }

    #[test]
    fn test_powerball_shapes() {
        assert_eq!(normalize_powerball(&json!([12])), 12);
        assert_eq!(normalize_powerball(&json!(["9", 3])), 9);
        assert_eq!(normalize_powerball(&json!([])), 1);
        assert_eq!(normalize_powerball(&json!("{18}")), 18);
        assert_eq!(normalize_powerball(&json!("x")), 1);
        assert_eq!(normalize_powerball(&Value::Null), 1);
    }

    #[test]
    fn test_safely_parse_number() {
        assert_eq!(safely_parse_number(&json!(12.5)), 12.5);
        assert_eq!(safely_parse_number(&json!("  42.75abc")), 42.75);
        assert_eq!(safely_parse_number(&json!("$100")), 0.0);
        assert_eq!(safely_parse_number(&json!("1e3")), 1000.0);
        assert_eq!(safely_parse_number(&json!(null)), 0.0);
        assert_eq!(safely_parse_number(&json!(".5")), 0.5);
    }

    #[test]
    fn test_thousands_separated_input_truncates_at_comma() {
        let parsed = safely_parse_number(&json!("1,234.5"));
        assert_eq!(parsed, 1.0);
        assert_eq!(format_currency(&Value::from(parsed)), "$1");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(&json!(1_500_000)), "$1,500,000");
        assert_eq!(format_currency(&json!("2500.5")), "$2,500.50");
        assert_eq!(format_currency(&json!(0)), "$0");
        assert_eq!(format_currency(&json!("garbage")), "$0");
        assert_eq!(format_currency(&json!(999)), "$999");
        assert_eq!(format_usd(-1234.0), "-$1,234");
    }

    #[test]
    fn test_normalize_draw_date() {
        assert_eq!(normalize_draw_date(&json!("2024-03-05")), "2024-03-05");
        assert_eq!(normalize_draw_date(&json!("2024-03-05T00:00:00")), "2024-03-05");
        assert_eq!(normalize_draw_date(&json!("Tue, 05 Mar 2024 00:00:00 GMT")), "2024-03-05");
        assert_eq!(normalize_draw_date(&json!(20240305)), "");
    }

    #[test]
    fn test_normalize_confidence() {
        assert_eq!(normalize_confidence(&json!(0.5)), 50.0);
        assert_eq!(normalize_confidence(&json!(87.5)), 87.5);
        assert_eq!(normalize_confidence(&json!(250)), 100.0);
        assert_eq!(normalize_confidence(&json!(-3)), 0.0);
    }
}
