//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use attendance_core::WeeklySchedule;
use tracing::Level;
use url::Url;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where rosters are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process memory only; lost on restart.
    Memory,
    /// A single JSON file, for one device.
    File(PathBuf),
    /// A shared PostgreSQL database with live notifications.
    Postgres(String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage: StorageBackend,
    pub log_level: Level,
    pub admin_token: Option<String>,
    pub checkin_base_url: Url,
    pub schedule: WeeklySchedule,
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

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Storage Settings ---
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "file".to_string());
        let storage = match backend.to_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "file" => StorageBackend::File(
                std::env::var("DATA_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./attendance.json")),
            ),
            "postgres" => StorageBackend::Postgres(
                std::env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
            ),
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{}' is not one of memory, file, postgres", other),
                ))
            }
        };

        // --- Load Identity and Check-In Settings ---
        let admin_token = std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        let base_url_str = std::env::var("CHECKIN_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/".to_string());
        let checkin_base_url = Url::parse(&base_url_str).map_err(|e| {
            ConfigError::InvalidValue("CHECKIN_BASE_URL".to_string(), e.to_string())
        })?;

        let schedule = match std::env::var("WEEKLY_SCHEDULE") {
            Ok(table) => WeeklySchedule::from_str(&table).map_err(|e| {
                ConfigError::InvalidValue("WEEKLY_SCHEDULE".to_string(), e.to_string())
            })?,
            Err(_) => WeeklySchedule::every_day(),
        };

        Ok(Self {
            bind_address,
            storage,
            log_level,
            admin_token,
            checkin_base_url,
            schedule,
        })
    }
}
