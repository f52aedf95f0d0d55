//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use study_gate_core::codegen::{CodeSpec, DEFAULT_CODE_LENGTH, DEFAULT_POOL_SIZE};
use study_gate_core::flow::DEFAULT_QUESTION_COUNT;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub session_secret: String,
    pub session_ttl: chrono::Duration,
    pub cookie_secure: bool,
    pub cors_origin: String,
    pub content_api_key: Option<String>,
    pub content_api_base: String,
    pub content_model: String,
    pub content_timeout: Duration,
    pub question_count: usize,
    pub code_spec: CodeSpec,
    pub codes_export_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:5000"))?;
        let database_url = var_or("DATABASE_URL", "sqlite://database.db");

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Session Settings ---
        let session_secret = lookup("SECRET_KEY")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("SECRET_KEY".to_string()))?;
        let ttl_minutes: i64 = parse_var("SESSION_TTL_MINUTES", &var_or("SESSION_TTL_MINUTES", "720"))?;
        if ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_MINUTES".to_string(),
                "must be positive".to_string(),
            ));
        }
        let cookie_secure: bool = parse_var("COOKIE_SECURE", &var_or("COOKIE_SECURE", "true"))?;
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:5000");

        // --- Content Service Settings (the API key is optional until first use) ---
        let content_api_key = lookup("GROQ_API_KEY").filter(|k| !k.trim().is_empty());
        let content_api_base = var_or("CONTENT_API_BASE", "https://api.groq.com/openai/v1");
        let content_model = var_or("CONTENT_MODEL", "llama-3.3-70b-versatile");
        let timeout_secs: u64 = parse_var("CONTENT_TIMEOUT_SECS", &var_or("CONTENT_TIMEOUT_SECS", "30"))?;
        let question_count: usize = parse_var(
            "QUESTION_COUNT",
            &var_or("QUESTION_COUNT", &DEFAULT_QUESTION_COUNT.to_string()),
        )?;

        // --- Code Pool Settings ---
        let count: usize = parse_var(
            "CODE_POOL_SIZE",
            &var_or("CODE_POOL_SIZE", &DEFAULT_POOL_SIZE.to_string()),
        )?;
        let length: usize = parse_var(
            "CODE_LENGTH",
            &var_or("CODE_LENGTH", &DEFAULT_CODE_LENGTH.to_string()),
        )?;
        if length == 0 {
            return Err(ConfigError::InvalidValue(
                "CODE_LENGTH".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let codes_export_path = PathBuf::from(var_or("CODES_EXPORT_PATH", "my_student_codes.txt"));

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            session_secret,
            session_ttl: chrono::Duration::minutes(ttl_minutes),
            cookie_secure,
            cors_origin,
            content_api_key,
            content_api_base,
            content_model,
            content_timeout: Duration::from_secs(timeout_secs),
            question_count,
            code_spec: CodeSpec { count, length },
            codes_export_path,
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
