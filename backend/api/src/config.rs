//! Application configuration loaded from environment variables.

use questboard_engine::{EngineConfig, Money};

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Base URL of the hosted payment processor
    pub processor_url: String,
    /// ISO currency code for all charges (single-currency deployment)
    pub currency: String,
    /// Flat platform fee per settled quest, in minor units
    pub platform_fee_minor: i64,
    /// Optional cap on reject/rework cycles per quest (unset = unlimited)
    pub max_rework_cycles: Option<u32>,
    /// How often (in seconds) to sweep for expired open quests
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./questboard.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            processor_url: env_var("PROCESSOR_URL").map_err(|_| {
                ApiError::Config("PROCESSOR_URL environment variable is required".to_string())
            })?,
            currency: env_var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            platform_fee_minor: env_var("PLATFORM_FEE_MINOR")
                .unwrap_or_else(|_| "250".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid PLATFORM_FEE_MINOR".to_string()))?,
            max_rework_cycles: match env_var("MAX_REWORK_CYCLES") {
                Ok(v) => Some(
                    v.parse()
                        .map_err(|_| ApiError::Config("Invalid MAX_REWORK_CYCLES".to_string()))?,
                ),
                Err(_) => None,
            },
            sweep_interval_secs: env_var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid SWEEP_INTERVAL_SECS".to_string()))?,
        })
    }

    /// The engine-facing slice of the configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            currency: self.currency.clone(),
            platform_fee: Money::from_minor_units(self.platform_fee_minor),
            max_rework_cycles: self.max_rework_cycles,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}
