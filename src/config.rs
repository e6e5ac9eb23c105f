/// Configuration management for the publishing service
use crate::error::{PublishError, PublishResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub publishing: PublishingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub content_db: PathBuf,
}

/// Publishing pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Per-operation timeout for queue-wrapped publish operations
    pub operation_timeout_secs: u64,

    /// Maximum failed attempts per operator before publishes are rejected
    pub max_retry_attempts: u32,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 60,
            max_retry_attempts: 3,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> PublishResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("PUBLISH_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("PUBLISH_PORT")
            .unwrap_or_else(|_| "3100".to_string())
            .parse()
            .map_err(|_| PublishError::Validation("Invalid port number".to_string()))?;
        let version = env::var("PUBLISH_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("PUBLISH_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let content_db = env::var("PUBLISH_CONTENT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("content.sqlite"));

        let operation_timeout_secs = env::var("PUBLISH_OPERATION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);
        let max_retry_attempts = env::var("PUBLISH_MAX_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        let config = Self {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                content_db,
            },
            publishing: PublishingConfig {
                operation_timeout_secs,
                max_retry_attempts,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> PublishResult<()> {
        if self.publishing.operation_timeout_secs == 0 {
            return Err(PublishError::Validation(
                "Operation timeout must be at least 1 second".to_string(),
            ));
        }
        if self.publishing.max_retry_attempts == 0 {
            return Err(PublishError::Validation(
                "Retry budget must be at least 1 attempt".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 3100,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                content_db: PathBuf::from("./data/content.sqlite"),
            },
            publishing: PublishingConfig::default(),
        }
    }
}
