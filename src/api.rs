use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::session::{Session, SessionStore};
use crate::types::{
    CheckRequest, CheckResponse, CheckResult, Draw, NewDraw, NumberCounts, PairCount,
    PositionInsight, Prediction, PredictionRequest, RawDraw, RawPrediction, RegisterRequest,
    ScrapeOutcome, TokenResponse, UserStats,
};
use crate::validation::validate_draw;

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

enum Body {
    Empty,
    Json(Value),
    Form(Vec<(&'static str, String)>),
}

/// One API request. Path segments and query values are encoded when the URL
/// is built.
struct Call {
    method: Method,
    segments: Vec<String>,
    query: Vec<(&'static str, String)>,
    authenticated: bool,
    body: Body,
}

impl Call {
    fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            authenticated: true,
            body: Body::Empty,
        }
    }

    fn get(segments: &[&str]) -> Self {
        Self::new(Method::GET, segments)
    }

    fn post(segments: &[&str]) -> Self {
        Self::new(Method::POST, segments)
    }

    fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Only GET and PUT are safe to replay; a POST may already have been
    /// applied when the connection dropped.
    fn is_idempotent(&self) -> bool {
        self.method == Method::GET || self.method == Method::PUT
    }
}

/// Client for the Powerball Analyzer REST API.
///
/// Holds the current session in memory and mirrors every login/logout into
/// the [`SessionStore`], so a 401 from any endpoint leaves no stale token
/// behind.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    session: Mutex<Option<Session>>,
    store: SessionStore,
}

impl ApiClient {
    pub fn new(config: &Config, store: SessionStore) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Self::with_http_client(config, store, builder.build()?)
    }

    pub fn with_http_client(
        config: &Config,
        store: SessionStore,
        http: reqwest::Client,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.api_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {}", config.api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.api_url.clone()));
        }

        let session = store.load()?;
        if let Some(s) = &session {
            debug!(username = %s.username, "restored session");
        }

        Ok(Self {
            http,
            base_url,
            max_retries: config.max_retries,
            session: Mutex::new(session),
            store,
        })
    }

    fn session_guard(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session(&self) -> Option<Session> {
        self.session_guard().clone()
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let form = vec![
            ("username", username.to_string()),
            ("password", password.to_string()),
        ];
        let call = Call::post(&["api", "auth", "token"])
            .anonymous()
            .body(Body::Form(form));
        let token: TokenResponse = serde_json::from_value(self.send(call).await?)?;

        let session = Session::from(token);
        self.store.save(&session)?;
        *self.session_guard() = Some(session.clone());
        info!(username = %session.username, is_admin = session.is_admin, "logged in");
        Ok(session)
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        let previous = self.session_guard().take();
        self.store.clear()?;
        if let Some(s) = previous {
            info!(username = %s.username, "logged out");
        }
        Ok(())
    }

    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<Value, ApiError> {
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.map(str::to_string),
            password: password.to_string(),
        };
        let call = Call::post(&["api", "auth", "register"])
            .anonymous()
            .body(json_body(&request)?);
        self.send(call).await
    }

    pub async fn list_draws(&self, limit: u32, offset: u32) -> Result<Vec<Draw>, ApiError> {
        let call = Call::get(&["api", "draws"])
            .query("limit", limit)
            .query("offset", offset);
        let value = self.send(call).await?;
        Ok(decode_list::<RawDraw>(value, "draws")
            .into_iter()
            .map(Draw::from)
            .collect())
    }

    pub async fn get_draw(&self, id: &str) -> Result<Draw, ApiError> {
        let value = self.send(Call::get(&["api", "draws", id])).await?;
        let raw: RawDraw = serde_json::from_value(unwrap_key(value, "draw"))?;
        Ok(Draw::from(raw))
    }

    /// Validates, sorts the white balls and submits a new draw.
    pub async fn create_draw(&self, draw: NewDraw) -> Result<Draw, ApiError> {
        self.require_admin()?;
        let validation = validate_draw(
            draw.draw_number,
            &draw.draw_date,
            &draw.white_balls,
            draw.powerball,
        );
        if !validation.is_valid {
            return Err(ApiError::Validation(validation.errors));
        }

        let draw = draw.with_sorted_white_balls();
        let call = Call::post(&["api", "draws", "add"]).body(json_body(&draw)?);
        let value = self.send(call).await?;

        match value.get("draw") {
            Some(created) if created.is_object() => {
                let raw: RawDraw = serde_json::from_value(created.clone())?;
                Ok(Draw::from(raw))
            }
            _ => Ok(Draw {
                id: String::new(),
                draw_number: draw.draw_number,
                draw_date: draw.draw_date,
                white_balls: draw.white_balls,
                white_balls_padded: false,
                powerball: draw.powerball,
                jackpot_amount: draw.jackpot_amount.unwrap_or(0.0),
                winners: draw.winners.unwrap_or(0),
            }),
        }
    }

    pub async fn update_winners(&self, id: &str, winners: u32) -> Result<Value, ApiError> {
        self.require_admin()?;
        let call = Call::new(Method::PUT, &["api", "draws", id, "winner"])
            .body(Body::Json(json!({ "winners": winners })));
        self.send(call).await
    }

    pub async fn list_predictions(
        &self,
        method: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Prediction>, ApiError> {
        let mut call = Call::get(&["api", "predictions"]).query("limit", limit);
        if let Some(method) = method {
            call = call.query("method", method);
        }
        let value = self.send(call).await?;
        Ok(decode_list::<RawPrediction>(value, "predictions")
            .into_iter()
            .map(Prediction::from)
            .collect())
    }

    pub async fn generate_prediction(&self, method: &str) -> Result<Prediction, ApiError> {
        let request = PredictionRequest {
            method: method.to_string(),
            user_id: self.session().map(|s| s.user_id),
        };
        let call = Call::post(&["api", "predictions"]).body(json_body(&request)?);
        let value = self.send(call).await?;
        let raw: RawPrediction = serde_json::from_value(unwrap_key(value, "prediction"))?;
        Ok(Prediction::from(raw))
    }

    pub async fn frequency_insight(&self) -> Result<NumberCounts, ApiError> {
        self.get_json(&["api", "insights", "frequency"]).await
    }

    pub async fn hot_numbers(&self) -> Result<NumberCounts, ApiError> {
        self.get_json(&["api", "insights", "hot"]).await
    }

    pub async fn due_numbers(&self) -> Result<NumberCounts, ApiError> {
        self.get_json(&["api", "insights", "due"]).await
    }

    pub async fn pair_insight(&self) -> Result<Vec<PairCount>, ApiError> {
        self.get_json(&["api", "insights", "pairs"]).await
    }

    pub async fn position_insight(&self) -> Result<Vec<PositionInsight>, ApiError> {
        self.get_json(&["api", "insights", "positions"]).await
    }

    pub async fn check_numbers(
        &self,
        draw_id: &str,
        white_balls: [u8; 5],
        powerball: u8,
    ) -> Result<CheckResult, ApiError> {
        let user_id = self.session().map(|s| s.user_id).unwrap_or_default();
        let mut numbers = white_balls.to_vec();
        numbers.push(powerball);

        let request = CheckRequest {
            user_id,
            draw_id: draw_id.to_string(),
            numbers,
        };
        let call = Call::post(&["api", "check_numbers"]).body(json_body(&request)?);
        let response: CheckResponse = serde_json::from_value(self.send(call).await?)?;
        Ok(CheckResult::from_response(response, powerball))
    }

    pub async fn scrape_latest(&self) -> Result<ScrapeOutcome, ApiError> {
        self.require_admin()?;
        let value = self.send(Call::post(&["api", "scrape", "latest"])).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn user_stats(&self) -> Result<UserStats, ApiError> {
        self.get_json(&["api", "user_stats"]).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, ApiError> {
        let value = self.send(Call::get(segments)).await?;
        Ok(serde_json::from_value(value)?)
    }

    fn require_admin(&self) -> Result<(), ApiError> {
        match self.session_guard().as_ref() {
            None => Err(ApiError::NotAuthenticated),
            Some(s) if !s.is_admin => Err(ApiError::Forbidden),
            Some(_) => Ok(()),
        }
    }

    fn bearer_token(&self) -> Result<String, ApiError> {
        self.session_guard()
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(ApiError::NotAuthenticated)
    }

    fn endpoint(&self, segments: &[String]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in the constructor: the base URL can take path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, call: Call) -> Result<Value, ApiError> {
        let token = if call.authenticated {
            Some(self.bearer_token()?)
        } else {
            None
        };
        let url = self.endpoint(&call.segments);
        let max_retries = if call.is_idempotent() { self.max_retries } else { 0 };

        let mut attempt = 0;
        loop {
            match self.send_once(&call, &url, token.as_deref()).await {
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        method = %call.method,
                        path = url.path(),
                        attempt,
                        error = %e,
                        "retrying request"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn send_once(
        &self,
        call: &Call,
        url: &Url,
        token: Option<&str>,
    ) -> Result<Value, ApiError> {
        let method = &call.method;
        let path = url.path();

        let mut request = self.http.request(method.clone(), url.clone());
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request = match &call.body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Form(fields) => request.form(fields),
        };

        info!(%method, path, "api request");
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%method, path, status = status.as_u16(), body = %text, "api response");

        if status == StatusCode::UNAUTHORIZED && token.is_some() {
            warn!(path, "token rejected, clearing session");
            self.logout()?;
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&text, status),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn json_body<T: Serialize>(value: &T) -> Result<Body, ApiError> {
    Ok(Body::Json(serde_json::to_value(value)?))
}

fn unwrap_key(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or_default()
        }
        other => other,
    }
}

/// Accepts either a bare array or an object wrapping the array under `key`.
/// Elements that are not objects are skipped.
fn decode_list<T: serde::de::DeserializeOwned>(value: Value, key: &str) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(error = %e, key, "skipping malformed list element");
                None
            }
        })
        .collect()
}

/// FastAPI reports failures as `{"detail": "..."}` or, for request
/// validation, `{"detail": [{"msg": "..."}]}`.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let detail = value
            .get("detail")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"));
        match detail {
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|i| i.get("msg").and_then(Value::as_str))
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            _ => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        trimmed.to_string()
    }
}
