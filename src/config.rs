use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::leech::LeechConfig;
use crate::sm2_scheduler::SchedulerConfig;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub srs: SrsConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Scheduling policy configuration: the new-card cap for the due queue and
/// the leech thresholds. SM-2 parameters follow the algorithm's defaults.
#[derive(Debug, Clone)]
pub struct SrsConfig {
    pub max_new_cards_per_day: usize,
    pub scheduler: SchedulerConfig,
    pub leech: LeechConfig,
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            max_new_cards_per_day: 20,
            scheduler: SchedulerConfig::default(),
            leech: LeechConfig::default(),
        }
    }
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            srs: SrsConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            max_new_cards_per_day = self.srs.max_new_cards_per_day,
            leech_fail_threshold = self.srs.leech.fail_threshold,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.contains("sqlite:") && !self.database.url.contains("postgres://") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:' or 'postgres://'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.srs.leech.fail_threshold <= 0 || self.srs.leech.hard_fail_threshold <= 0 {
            return Err(anyhow!("Leech thresholds must be greater than 0"));
        }

        if self.srs.leech.hard_fail_threshold < self.srs.leech.fail_threshold {
            return Err(anyhow!(
                "LEECH_HARD_FAIL_THRESHOLD must be >= LEECH_FAIL_THRESHOLD"
            ));
        }

        if self.srs.max_new_cards_per_day == 0 {
            warn!("MAX_NEW_CARDS_PER_DAY is 0 - new cards will never enter the due queue");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.logging.level.to_lowercase().as_str())
        {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:vocab_srs.db".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl SrsConfig {
    fn from_env() -> Result<Self> {
        let defaults = SrsConfig::default();
        let leech_defaults = defaults.leech.clone();

        Ok(SrsConfig {
            max_new_cards_per_day: parse_env_var(
                "MAX_NEW_CARDS_PER_DAY",
                defaults.max_new_cards_per_day,
            )?,
            scheduler: defaults.scheduler,
            leech: LeechConfig {
                fail_threshold: parse_env_var("LEECH_FAIL_THRESHOLD", leech_defaults.fail_threshold)?,
                hard_fail_threshold: parse_env_var(
                    "LEECH_HARD_FAIL_THRESHOLD",
                    leech_defaults.hard_fail_threshold,
                )?,
                relapse_interval_days: parse_env_var(
                    "LEECH_RELAPSE_INTERVAL_DAYS",
                    leech_defaults.relapse_interval_days,
                )?,
            },
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,vocab_srs=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

fn parse_env_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be a number", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}
