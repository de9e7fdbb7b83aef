use anyhow::{Context, Result, bail};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::ApiClient;
use crate::import::parse_file_content;
use crate::normalize::format_usd;
use crate::types::NewDraw;
use crate::upload::BatchUploader;
use crate::validation::{validate_draw_parameters, validate_ticket};

/// Raw draw fields as typed by the operator.
#[derive(Debug, Clone)]
pub struct DrawInput {
    pub draw_number: String,
    pub draw_date: String,
    pub white_balls: Vec<String>,
    pub powerball: String,
    pub jackpot_amount: Option<f64>,
    pub winners: Option<u32>,
}

impl DrawInput {
    /// Only called once the fields have passed validation.
    fn to_new_draw(&self) -> Result<NewDraw> {
        let mut white_balls = [0u8; 5];
        for (slot, raw) in white_balls.iter_mut().zip(&self.white_balls) {
            *slot = raw.trim().parse().with_context(|| format!("Invalid white ball '{}'", raw))?;
        }

        Ok(NewDraw {
            draw_number: self.draw_number.trim().parse().context("Invalid draw number")?,
            draw_date: self.draw_date.trim().to_string(),
            white_balls,
            powerball: self.powerball.trim().parse().context("Invalid powerball")?,
            jackpot_amount: self.jackpot_amount,
            winners: self.winners,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    Frequency,
    Hot,
    Due,
    Pairs,
    Positions,
}

pub struct AuthUseCase {
    client: Arc<ApiClient>,
}

impl AuthUseCase {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let session = self.client.login(username, password).await?;

        Ok(json!({
            "success": true,
            "session": session,
            "message": format!("Logged in as {}", session.username)
        })
        .to_string())
    }

    pub async fn logout(&self) -> Result<String> {
        self.client.logout()?;

        Ok(json!({
            "success": true,
            "message": "Logged out"
        })
        .to_string())
    }

    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<String> {
        let response = self.client.register(username, email, password).await?;

        Ok(json!({
            "success": true,
            "response": response,
            "message": format!("Registered {}, you can now log in", username)
        })
        .to_string())
    }

    pub async fn whoami(&self) -> Result<String> {
        let Some(session) = self.client.session() else {
            return Ok(json!({
                "success": false,
                "message": "Not logged in"
            })
            .to_string());
        };

        Ok(json!({
            "success": true,
            "session": session
        })
        .to_string())
    }
}

pub struct DrawUseCase {
    client: Arc<ApiClient>,
    batch_size: usize,
}

impl DrawUseCase {
    pub fn new(client: Arc<ApiClient>, batch_size: usize) -> Self {
        Self { client, batch_size }
    }

    pub async fn list_draws(&self, limit: u32, offset: u32) -> Result<String> {
        let draws = self.client.list_draws(limit, offset).await?;

        Ok(json!({
            "success": true,
            "count": draws.len(),
            "draws": draws
        })
        .to_string())
    }

    pub async fn show_draw(&self, id: &str) -> Result<String> {
        let draw = self.client.get_draw(id).await?;

        Ok(json!({
            "success": true,
            "jackpot": format_usd(draw.jackpot_amount),
            "draw": draw
        })
        .to_string())
    }

    pub async fn add_draw(&self, input: &DrawInput) -> Result<String> {
        let validation = validate_draw_parameters(
            &input.draw_number,
            &input.draw_date,
            input.white_balls.as_slice(),
            &input.powerball,
        );
        if !validation.is_valid {
            bail!("Invalid draw: {}", validation.messages().join("; "));
        }

        let draw = self.client.create_draw(input.to_new_draw()?).await?;

        Ok(json!({
            "success": true,
            "draw": draw,
            "message": format!("Draw {} added", draw.draw_number)
        })
        .to_string())
    }

    pub async fn update_winners(&self, id: &str, winners: u32) -> Result<String> {
        let response = self.client.update_winners(id, winners).await?;

        Ok(json!({
            "success": true,
            "response": response,
            "message": format!("Draw {} now has {} winner(s)", id, winners)
        })
        .to_string())
    }

    pub async fn import_files(&self, files: &[PathBuf]) -> Result<String> {
        if files.is_empty() {
            bail!("No files given");
        }

        let uploader = BatchUploader::new(Arc::clone(&self.client), self.batch_size);
        let report = uploader.upload_files(files).await;

        Ok(json!({
            "success": report.totals.failed == 0 && report.failed_files() == 0,
            "message": report.summary(),
            "report": report
        })
        .to_string())
    }

    pub async fn scrape_latest(&self) -> Result<String> {
        let outcome = self.client.scrape_latest().await?;

        Ok(json!({
            "success": outcome.success,
            "message": outcome.message,
            "draw": outcome.draw()
        })
        .to_string())
    }
}

pub struct AnalysisUseCase {
    client: Arc<ApiClient>,
}

impl AnalysisUseCase {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn generate_prediction(&self, method: &str) -> Result<String> {
        let prediction = self.client.generate_prediction(method).await?;

        Ok(json!({
            "success": true,
            "prediction": prediction
        })
        .to_string())
    }

    pub async fn list_predictions(&self, method: Option<&str>, limit: u32) -> Result<String> {
        let predictions = self.client.list_predictions(method, limit).await?;

        Ok(json!({
            "success": true,
            "count": predictions.len(),
            "predictions": predictions
        })
        .to_string())
    }

    pub async fn insight(&self, kind: InsightKind) -> Result<String> {
        let (name, data) = match kind {
            InsightKind::Frequency => ("frequency", json!(self.client.frequency_insight().await?)),
            InsightKind::Hot => ("hot", json!(self.client.hot_numbers().await?)),
            InsightKind::Due => ("due", json!(self.client.due_numbers().await?)),
            InsightKind::Pairs => ("pairs", json!(self.client.pair_insight().await?)),
            InsightKind::Positions => ("positions", json!(self.client.position_insight().await?)),
        };

        Ok(json!({
            "success": true,
            "insight": name,
            "data": data
        })
        .to_string())
    }

    pub async fn check_numbers(
        &self,
        draw_id: &str,
        white_balls: &[String],
        powerball: &str,
    ) -> Result<String> {
        let validation = validate_ticket(white_balls, powerball);
        if !validation.is_valid {
            bail!("Invalid numbers: {}", validation.messages().join("; "));
        }

        let mut balls = [0u8; 5];
        for (slot, raw) in balls.iter_mut().zip(white_balls) {
            *slot = raw.trim().parse()?;
        }
        let powerball: u8 = powerball.trim().parse()?;

        let result = self.client.check_numbers(draw_id, balls, powerball).await?;

        Ok(json!({
            "success": true,
            "result": result
        })
        .to_string())
    }

    pub async fn user_stats(&self) -> Result<String> {
        let stats = self.client.user_stats().await?;

        Ok(json!({
            "success": true,
            "stats": stats
        })
        .to_string())
    }
}

/// Runs the draw validator without touching the network.
pub fn validate_input(input: &DrawInput) -> Result<String> {
    let validation = validate_draw_parameters(
        &input.draw_number,
        &input.draw_date,
        input.white_balls.as_slice(),
        &input.powerball,
    );

    Ok(json!({
        "success": validation.is_valid,
        "is_valid": validation.is_valid,
        "errors": validation.messages()
    })
    .to_string())
}

/// Parses import files and reports what would be uploaded.
pub async fn preview_import(files: &[PathBuf]) -> Result<String> {
    let mut results = Vec::with_capacity(files.len());

    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Could not read {}", path.display()))?;

        match parse_file_content(&text, &file_name) {
            Ok(items) => results.push(json!({
                "file": path.display().to_string(),
                "count": items.len(),
                "items": items
            })),
            Err(e) => results.push(json!({
                "file": path.display().to_string(),
                "error": e.to_string()
            })),
        }
    }

    Ok(json!({
        "success": results.iter().all(|r| r.get("error").is_none()),
        "files": results
    })
    .to_string())
}
