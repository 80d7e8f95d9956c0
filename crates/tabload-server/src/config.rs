//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default maximum load attempts (1 = retries disabled).
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default base delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default maximum data file size in megabytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 1000;

/// Default overall invocation timeout in seconds; primarily bounds the
/// warehouse load polling step.
pub const DEFAULT_TIMEOUT_SECS: u64 = 540;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether status emails are sent at all
    pub email_enabled: bool,
    /// Maximum load attempts including the first (1 = no retries)
    pub max_retries: u32,
    /// Base delay between retry attempts in seconds
    pub retry_delay_secs: u64,
    /// Maximum accepted data file size in megabytes
    pub max_file_size_mb: u64,
    /// Overall invocation timeout in seconds
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("TABLOAD_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("TABLOAD_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("TABLOAD_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            pipeline: PipelineConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }
        self.pipeline.validate()?;
        Ok(())
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            email_enabled: std::env::var("EMAIL_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            max_retries: std::env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay_secs: std::env::var("RETRY_DELAY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_DELAY_SECS),
            max_file_size_mb: std::env::var("MAX_FILE_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB),
            timeout_secs: std::env::var("TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Validate pipeline configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("MAX_RETRIES must be at least 1 (one attempt)");
        }
        if self.max_file_size_mb == 0 {
            anyhow::bail!("MAX_FILE_SIZE_MB must be greater than 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("TIMEOUT_SECONDS must be greater than 0");
        }
        Ok(())
    }

    /// Maximum data file size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Base retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Overall invocation timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            email_enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            pipeline: PipelineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert!(config.email_enabled);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_delay_secs, 5);
        assert_eq!(config.max_file_size_mb, 1000);
        assert_eq!(config.timeout_secs, 540);
    }

    #[test]
    fn test_pipeline_config_validation() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        let config = PipelineConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_file_size_bytes() {
        let config = PipelineConfig {
            max_file_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(config.max_file_size_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_duration_helpers() {
        let config = PipelineConfig {
            retry_delay_secs: 7,
            timeout_secs: 120,
            ..Default::default()
        };
        assert_eq!(config.retry_delay(), Duration::from_secs(7));
        assert_eq!(config.timeout(), Duration::from_secs(120));
    }
}
