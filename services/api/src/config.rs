//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
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
    pub upload_dir: PathBuf,
    /// Organization email → plaintext password or argon2 PHC string.
    pub org_credentials: HashMap<String, String>,
    /// Addresses notified about every new upload.
    pub upload_watchers: Vec<String>,
    pub openai_api_key: Option<String>,
    pub vision_model: String,
    pub detection_labels: Vec<String>,
    pub max_upload_bytes: usize,
    /// Sessions unused for this long are dropped.
    pub session_idle_ttl: Duration,
    pub max_sessions: usize,
}

const DEFAULT_LABELS: &str = "plastic,paper,cardboard,metal,can,glass,bottle,bag,organic,e-waste";

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

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data.db?mode=rwc".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));

        let max_upload_bytes = parse_number(
            "MAX_UPLOAD_BYTES",
            std::env::var("MAX_UPLOAD_BYTES").ok(),
            10 * 1024 * 1024,
        )?;

        // --- Load Session Limits ---
        let session_idle_ttl = Duration::from_secs(parse_number(
            "SESSION_IDLE_SECS",
            std::env::var("SESSION_IDLE_SECS").ok(),
            12 * 60 * 60,
        )?);
        let max_sessions =
            parse_number("MAX_SESSIONS", std::env::var("MAX_SESSIONS").ok(), 10_000)?;

        // --- Load Organization Credentials & Notification Targets ---
        let org_credentials =
            parse_org_credentials(&std::env::var("ORG_CREDENTIALS").unwrap_or_default())?;
        let upload_watchers = parse_list(&std::env::var("UPLOAD_WATCHERS").unwrap_or_default());

        // --- Load Detection Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let vision_model =
            std::env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let detection_labels = parse_list(
            &std::env::var("DETECTION_LABELS").unwrap_or_else(|_| DEFAULT_LABELS.to_string()),
        );
        if detection_labels.is_empty() {
            return Err(ConfigError::InvalidValue(
                "DETECTION_LABELS".to_string(),
                "at least one label is required".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            upload_dir,
            org_credentials,
            upload_watchers,
            openai_api_key,
            vision_model,
            detection_labels,
            max_upload_bytes,
            session_idle_ttl,
            max_sessions,
        })
    }

    /// The OpenAI key is optional while loading so tests and tooling can build a
    /// `Config`, but the server cannot detect anything without it.
    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
    }
}

fn parse_number<T>(var: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Parses `email=secret;email=secret`. Secrets may contain `=` (argon2 PHC strings do).
pub fn parse_org_credentials(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (email, secret) = entry.split_once('=').ok_or_else(|| {
                ConfigError::InvalidValue(
                    "ORG_CREDENTIALS".to_string(),
                    format!("entry '{}' is not of the form email=secret", entry),
                )
            })?;
            let (email, secret) = (email.trim(), secret.trim());
            if email.is_empty() || secret.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "ORG_CREDENTIALS".to_string(),
                    "email and secret must both be non-empty".to_string(),
                ));
            }
            Ok((email.to_string(), secret.to_string()))
        })
        .collect()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
