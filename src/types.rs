use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::normalize::{
    deserialize_lenient_timestamp, normalize_confidence, normalize_draw_date, normalize_powerball,
    normalize_white_balls_checked, safely_parse_number,
};

/// Draw as it arrives from `/api/draws`. Every numeric field stays a raw
/// JSON value until it goes through the normalizer.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawDraw {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub draw_number: Value,
    #[serde(default)]
    pub draw_date: Value,
    #[serde(default)]
    pub white_balls: Value,
    #[serde(default)]
    pub powerball: Value,
    #[serde(default)]
    pub jackpot_amount: Value,
    #[serde(default)]
    pub winners: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draw {
    pub id: String,
    pub draw_number: u32,
    pub draw_date: String,
    pub white_balls: [u8; 5],
    /// Set when the white balls were filled in by the normalizer; they are
    /// placeholders for display, not drawn numbers.
    pub white_balls_padded: bool,
    pub powerball: u8,
    pub jackpot_amount: f64,
    pub winners: u32,
}

impl From<RawDraw> for Draw {
    fn from(raw: RawDraw) -> Self {
        let balls = normalize_white_balls_checked(&raw.white_balls);
        Draw {
            id: opaque_id(&raw.id),
            draw_number: non_negative_u32(&raw.draw_number),
            draw_date: normalize_draw_date(&raw.draw_date),
            white_balls: balls.balls,
            white_balls_padded: balls.padded,
            powerball: normalize_powerball(&raw.powerball),
            jackpot_amount: safely_parse_number(&raw.jackpot_amount).max(0.0),
            winners: non_negative_u32(&raw.winners),
        }
    }
}

fn opaque_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn non_negative_u32(value: &Value) -> u32 {
    let n = safely_parse_number(value);
    if n <= 0.0 { 0 } else { n.min(u32::MAX as f64) as u32 }
}

/// Body of `POST /api/draws/add`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewDraw {
    pub draw_number: u32,
    pub draw_date: String,
    pub white_balls: [u8; 5],
    pub powerball: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jackpot_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winners: Option<u32>,
}

impl NewDraw {
    /// The API stores white balls ascending; display order is left alone
    /// everywhere else, so submission sorts explicitly.
    pub fn with_sorted_white_balls(mut self) -> Self {
        self.white_balls.sort_unstable();
        self
    }
}

/// One row of an imported CSV/TXT file, ready for upload.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadBatchItem {
    pub draw_number: u32,
    pub draw_date: String,
    pub white_balls: [u8; 5],
    pub powerball: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jackpot_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winners: Option<u32>,
}

impl From<&UploadBatchItem> for NewDraw {
    fn from(item: &UploadBatchItem) -> Self {
        NewDraw {
            draw_number: item.draw_number,
            draw_date: item.draw_date.clone(),
            white_balls: item.white_balls,
            powerball: item.powerball,
            jackpot_amount: item.jackpot_amount,
            winners: item.winners,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct RawPrediction {
    #[serde(default)]
    pub white_balls: Value,
    #[serde(default)]
    pub powerball: Value,
    #[serde(default)]
    pub confidence: Value,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, alias = "timestamp", deserialize_with = "deserialize_lenient_timestamp")]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub white_balls: [u8; 5],
    pub white_balls_padded: bool,
    pub powerball: u8,
    pub confidence: f64,
    pub method: String,
    pub created_at: Option<NaiveDateTime>,
}

impl From<RawPrediction> for Prediction {
    fn from(raw: RawPrediction) -> Self {
        let balls = normalize_white_balls_checked(&raw.white_balls);
        Prediction {
            white_balls: balls.balls,
            white_balls_padded: balls.padded,
            powerball: normalize_powerball(&raw.powerball),
            confidence: normalize_confidence(&raw.confidence),
            method: raw.method.unwrap_or_else(|| "unknown".to_string()),
            created_at: raw.created_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct PredictionRequest {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct CheckRequest {
    pub user_id: String,
    pub draw_id: String,
    /// Five white balls followed by the powerball.
    pub numbers: Vec<u8>,
}

#[derive(Deserialize, Debug)]
pub struct CheckResponse {
    #[serde(default)]
    pub white_matches: Vec<Value>,
    #[serde(default)]
    pub powerball_match: bool,
    #[serde(default)]
    pub is_winner: bool,
    #[serde(default)]
    pub prize: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub matched_white_balls: Vec<u8>,
    pub matched_powerball: Option<u8>,
    pub is_winner: bool,
    pub prize: Option<String>,
}

impl CheckResult {
    pub fn from_response(response: CheckResponse, submitted_powerball: u8) -> Self {
        let matched_white_balls = response
            .white_matches
            .iter()
            .map(safely_parse_number)
            .filter(|n| (1.0..=69.0).contains(n))
            .map(|n| n as u8)
            .collect();

        CheckResult {
            matched_white_balls,
            matched_powerball: response.powerball_match.then_some(submitted_powerball),
            is_winner: response.is_winner,
            prize: response.prize,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Serialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct UserStats {
    #[serde(default)]
    pub draws_added: u32,
    #[serde(default)]
    pub predictions_made: u32,
    #[serde(default)]
    pub analysis_runs: u32,
}

/// Shape shared by the frequency, hot and due insights: number -> count
/// (or last draw number for the due insight).
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct NumberCounts {
    #[serde(default)]
    pub white_balls: BTreeMap<u8, i64>,
    #[serde(default)]
    pub powerballs: BTreeMap<u8, i64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PairCount {
    pub pair: [u8; 2],
    pub count: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NumberCount {
    pub number: u8,
    pub count: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PositionInsight {
    pub position: u8,
    #[serde(default)]
    pub top_numbers: Vec<NumberCount>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ScrapeOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing)]
    pub draw: Option<RawDraw>,
}

impl ScrapeOutcome {
    pub fn draw(&self) -> Option<Draw> {
        self.draw.clone().map(Draw::from)
    }
}

fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(opaque_id(&value))
}
