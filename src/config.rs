use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5001";
pub const DEFAULT_SESSION_PATH: &str = "data/session.db";
pub const DEFAULT_UPLOAD_BATCH_SIZE: usize = 50;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub session_path: String,
    /// Extra attempts after a transport error or 5xx. Off unless configured.
    /// Only GET and PUT are retried; a POST is sent once.
    pub max_retries: u32,
    pub request_timeout: Option<Duration>,
    pub upload_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            session_path: DEFAULT_SESSION_PATH.to_string(),
            max_retries: 0,
            request_timeout: None,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
        }
    }
}

pub fn load() -> Result<Config> {
    load_from(|key| env::var(key).ok())
}

fn load_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let api_url = lookup("POWERBALL_API_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or(defaults.api_url);

    let session_path = lookup("POWERBALL_SESSION_PATH").unwrap_or(defaults.session_path);

    let max_retries = parse_var(&lookup, "POWERBALL_MAX_RETRIES")?.unwrap_or(defaults.max_retries);

    let request_timeout = parse_var::<u64, _>(&lookup, "POWERBALL_TIMEOUT_SECS")?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let upload_batch_size = parse_var(&lookup, "POWERBALL_UPLOAD_BATCH_SIZE")?
        .filter(|size: &usize| *size > 0)
        .unwrap_or(defaults.upload_batch_size);

    Ok(Config {
        api_url,
        session_path,
        max_retries,
        request_timeout,
        upload_batch_size,
    })
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: '{}'", key, raw))
        })
        .transpose()
}
