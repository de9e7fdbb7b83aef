//! CSV/TXT draw import.
//!
//! Unlike the normalizer, nothing here is forgiving: the first bad row stops
//! the file so an operator never uploads a half-guessed draw.

use thiserror::Error;
use tracing::debug;

use crate::normalize::{POWERBALL_MAX, WHITE_BALL_MAX};
use crate::types::UploadBatchItem;
use crate::utils::reformat_draw_date;

const MIN_FIELDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    #[error("No draw rows found")]
    NoRecords,

    #[error("Line {line}: {message}")]
    MalformedRow { line: usize, message: String },

    #[error("Line {line}: expected at least 8 fields, found {found}")]
    TooFewFields { line: usize, found: usize },

    #[error("Line {line}: invalid draw number '{value}'")]
    InvalidDrawNumber { line: usize, value: String },

    #[error("Line {line}: invalid date '{value}' (expected YYYY-MM-DD, MM/DD/YYYY or MM/DD/YY)")]
    InvalidDate { line: usize, value: String },

    #[error("Line {line}: white ball {position} '{value}' must be a number between 1 and 69")]
    InvalidWhiteBall { line: usize, position: usize, value: String },

    #[error("Line {line}: powerball '{value}' must be a number between 1 and 26")]
    InvalidPowerball { line: usize, value: String },
}

/// Parses the contents of one uploaded file. Line numbers in errors are
/// 1-based positions in the original text, blank lines included.
pub fn parse_file_content(
    text: &str,
    file_name: &str,
) -> Result<Vec<UploadBatchItem>, ImportError> {
    let is_csv = file_name.to_ascii_lowercase().ends_with(".csv");

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .peekable();

    if let Some((line_no, first)) = lines.peek() {
        if is_header(first) {
            debug!(file = file_name, line = line_no, "skipping header row");
            lines.next();
        }
    }

    let mut items = Vec::new();
    for (line_no, line) in lines {
        let fields = split_fields(line_no, line, is_csv)?;
        items.push(parse_fields(line_no, &fields)?);
    }

    if items.is_empty() {
        return Err(ImportError::NoRecords);
    }
    debug!(file = file_name, rows = items.len(), "parsed import file");
    Ok(items)
}

fn is_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    ["draw", "date", "number"].iter().any(|word| lower.contains(word))
}

fn split_fields(line_no: usize, line: &str, is_csv: bool) -> Result<Vec<String>, ImportError> {
    if is_csv || line.contains(',') {
        return read_delimited(line_no, line, b',');
    }
    if line.contains('\t') {
        return read_delimited(line_no, line, b'\t');
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    // The date may span several tokens; it ends where the first pure
    // integer after it starts.
    let date_end = tokens
        .iter()
        .enumerate()
        .skip(2)
        .find(|(_, t)| t.chars().all(|c| c.is_ascii_digit()))
        .map(|(i, _)| i);

    let fields = match date_end {
        Some(end) => {
            let mut fields = Vec::with_capacity(tokens.len() - end + 2);
            fields.push(clean_token(tokens[0]));
            fields.push(tokens[1..end].join(" "));
            fields.extend(tokens[end..].iter().copied().map(clean_token));
            fields
        }
        None => tokens.into_iter().map(clean_token).collect(),
    };
    Ok(fields)
}

/// One physical line through the csv reader, so quoted fields keep their
/// embedded delimiters.
fn read_delimited(line_no: usize, line: &str, delimiter: u8) -> Result<Vec<String>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Ok(record.iter().map(|f| f.trim().to_string()).collect()),
        Ok(false) => Ok(Vec::new()),
        Err(e) => Err(ImportError::MalformedRow {
            line: line_no,
            message: e.to_string(),
        }),
    }
}

fn clean_token(field: &str) -> String {
    field.trim().trim_matches('"').trim().to_string()
}

fn parse_fields(line: usize, fields: &[String]) -> Result<UploadBatchItem, ImportError> {
    if fields.len() < MIN_FIELDS {
        return Err(ImportError::TooFewFields {
            line,
            found: fields.len(),
        });
    }

    let draw_number = fields[0]
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ImportError::InvalidDrawNumber {
            line,
            value: fields[0].clone(),
        })?;

    let draw_date = reformat_draw_date(&fields[1]).ok_or_else(|| ImportError::InvalidDate {
        line,
        value: fields[1].clone(),
    })?;

    let mut white_balls = [0u8; 5];
    for (i, slot) in white_balls.iter_mut().enumerate() {
        let raw = &fields[2 + i];
        *slot = parse_in_range(raw, WHITE_BALL_MAX).ok_or_else(|| ImportError::InvalidWhiteBall {
            line,
            position: i + 1,
            value: raw.clone(),
        })?;
    }

    let powerball =
        parse_in_range(&fields[7], POWERBALL_MAX).ok_or_else(|| ImportError::InvalidPowerball {
            line,
            value: fields[7].clone(),
        })?;

    Ok(UploadBatchItem {
        draw_number,
        draw_date,
        white_balls,
        powerball,
        jackpot_amount: fields.get(8).and_then(|f| parse_jackpot(f)),
        winners: fields.get(9).and_then(|f| f.parse::<u32>().ok()),
    })
}

fn parse_in_range(raw: &str, max: u8) -> Option<u8> {
    raw.parse::<i64>()
        .ok()
        .filter(|n| (1..=max as i64).contains(n))
        .map(|n| n as u8)
}

fn parse_jackpot(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
}
