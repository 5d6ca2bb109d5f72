use crate::engine::CommissionSchedule;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Schedule used when `COMMISSION_SCHEDULE` is unset.
pub const DEFAULT_COMMISSION_SCHEDULE: &str = "1:75000,2:12500,3:12500";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub purchase_api_url: String,
    pub commission_schedule: CommissionSchedule,
    /// Optional cap on upline levels walked, below the schedule's highest level.
    pub max_upline_depth: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let purchase_api_url = env_map
            .get("PURCHASE_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("PURCHASE_API_URL".to_string()))?;

        let commission_schedule = CommissionSchedule::from_str(
            env_map
                .get("COMMISSION_SCHEDULE")
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_COMMISSION_SCHEDULE),
        )
        .map_err(|e| ConfigError::InvalidValue("COMMISSION_SCHEDULE".to_string(), e.to_string()))?;

        if commission_schedule.is_empty() {
            return Err(ConfigError::InvalidValue(
                "COMMISSION_SCHEDULE".to_string(),
                "must configure at least one level".to_string(),
            ));
        }

        let max_upline_depth = env_map
            .get("MAX_UPLINE_DEPTH")
            .map(|s| {
                s.parse::<u32>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "MAX_UPLINE_DEPTH".to_string(),
                        "must be a valid u32".to_string(),
                    )
                })
            })
            .transpose()?;

        Ok(Config {
            port,
            database_path,
            purchase_api_url,
            commission_schedule,
            max_upline_depth,
        })
    }
}
