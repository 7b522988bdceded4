use crate::error::{ShortenerError, ShortenerResult};
use crate::keygen::DEFAULT_KEY_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the database DSN
pub const ENV_DATABASE_DSN: &str = "DATABASE_DSN";
/// Environment variable holding the journal file path
pub const ENV_FILE_STORAGE_PATH: &str = "FILE_STORAGE_PATH";
/// Environment variable holding the public base URL for short links
pub const ENV_BASE_URL: &str = "BASE_URL";
/// Environment variable overriding the short key length
pub const ENV_SHORT_KEY_LENGTH: &str = "SHORT_KEY_LENGTH";
/// Environment variable overriding the database pool size
pub const ENV_DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Database DSN; selects the relational backend when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_dsn: Option<String>,

    /// Journal path; selects the file backend when no DSN is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_storage_path: Option<PathBuf>,

    /// Prefix for rendered short URLs, e.g. `http://localhost:8080`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Number of characters in generated keys
    pub key_length: usize,

    /// Database pool size
    pub max_connections: u32,

    /// Timeout for the readiness ping, independent of the caller's deadline
    pub ready_timeout_ms: u64,
}

/// Which backend a configuration selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File,
    Database,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::File => "file",
            BackendKind::Database => "database",
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_dsn: None,
            file_storage_path: None,
            base_url: None,
            key_length: DEFAULT_KEY_LENGTH,
            max_connections: 5,
            ready_timeout_ms: 1000,
        }
    }
}

impl StorageConfig {
    /// Load configuration from the process environment
    ///
    /// Empty variables count as unset.
    pub fn from_env() -> ShortenerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> ShortenerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self {
            database_dsn: get(ENV_DATABASE_DSN),
            file_storage_path: get(ENV_FILE_STORAGE_PATH).map(PathBuf::from),
            base_url: get(ENV_BASE_URL),
            ..Self::default()
        };

        if let Some(raw) = get(ENV_SHORT_KEY_LENGTH) {
            config.key_length = raw.trim().parse().map_err(|_| {
                ShortenerError::ConfigError(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_SHORT_KEY_LENGTH, raw
                ))
            })?;
        }
        if let Some(raw) = get(ENV_DATABASE_MAX_CONNECTIONS) {
            config.max_connections = raw.trim().parse().map_err(|_| {
                ShortenerError::ConfigError(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_DATABASE_MAX_CONNECTIONS, raw
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Backend selected by this configuration: DSN, then file path, then memory
    pub fn backend_kind(&self) -> BackendKind {
        if self.database_dsn.as_deref().is_some_and(|dsn| !dsn.is_empty()) {
            BackendKind::Database
        } else if self
            .file_storage_path
            .as_ref()
            .is_some_and(|path| !path.as_os_str().is_empty())
        {
            BackendKind::File
        } else {
            BackendKind::Memory
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Check value ranges
    pub fn validate(&self) -> ShortenerResult<()> {
        if !(4..=64).contains(&self.key_length) {
            return Err(ShortenerError::ConfigError(format!(
                "key length must be between 4 and 64, got {}",
                self.key_length
            )));
        }
        if self.max_connections == 0 {
            return Err(ShortenerError::ConfigError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if let Some(base_url) = &self.base_url {
            url::Url::parse(base_url).map_err(|e| {
                ShortenerError::ConfigError(format!("invalid base URL '{}': {}", base_url, e))
            })?;
        }
        Ok(())
    }
}
