use crate::config::StorageConfig;
use crate::error::ShortenerResult;
use std::path::PathBuf;

/// Builder for constructing StorageConfig instances with a fluent API
///
/// # Example
/// ```
/// use shortener_lib::config::BackendKind;
/// use shortener_lib::StorageConfigBuilder;
///
/// let config = StorageConfigBuilder::new()
///     .file_storage_path("/tmp/short-urls.json")
///     .base_url("http://localhost:8080")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.backend_kind(), BackendKind::File);
/// ```
#[derive(Debug, Default)]
pub struct StorageConfigBuilder {
    config: StorageConfig,
}

impl StorageConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one read from the environment
    pub fn from_config(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Set the database DSN
    pub fn database_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.config.database_dsn = Some(dsn.into());
        self
    }

    /// Set the journal file path
    pub fn file_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.file_storage_path = Some(path.into());
        self
    }

    /// Set the base URL used to render short links
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Set the generated key length
    pub fn key_length(mut self, key_length: usize) -> Self {
        self.config.key_length = key_length;
        self
    }

    /// Set the database pool size
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.config.max_connections = max_connections;
        self
    }

    /// Set the readiness ping timeout
    pub fn ready_timeout_ms(mut self, ready_timeout_ms: u64) -> Self {
        self.config.ready_timeout_ms = ready_timeout_ms;
        self
    }

    /// Build the StorageConfig instance
    ///
    /// # Errors
    /// Returns `ShortenerError::ConfigError` if a value is out of range
    pub fn build(self) -> ShortenerResult<StorageConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
