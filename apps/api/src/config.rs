use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Root directory for locally stored resumes.
    pub upload_dir: String,
    /// Resumes are read from this bucket instead of `upload_dir` when set.
    pub s3: Option<S3Config>,
    pub batch_poll_interval: Duration,
    pub llm_timeout: Duration,
    pub extraction_timeout: Duration,
    pub db_busy_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let s3 = match optional_env("S3_BUCKET") {
            Some(bucket) => Some(S3Config {
                bucket,
                endpoint: optional_env("S3_ENDPOINT"),
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            s3,
            batch_poll_interval: Duration::from_secs(env_u64("BATCH_POLL_INTERVAL_SECS", 1800)?),
            llm_timeout: Duration::from_secs(env_u64("LLM_TIMEOUT_SECS", 180)?),
            extraction_timeout: Duration::from_secs(env_u64("EXTRACTION_TIMEOUT_SECS", 60)?),
            db_busy_timeout: Duration::from_millis(env_u64("DB_BUSY_TIMEOUT_MS", 5000)?),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match optional_env(key) {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))?;
            anyhow::ensure!(value > 0, "{key} must be greater than zero");
            Ok(value)
        }
        None => Ok(default),
    }
}
