//! Repository factory for creating the configured backend
//!
//! The factory picks exactly one backend per configuration: a database DSN
//! wins, then a journal path, then the in-memory map.

use super::database::DatabaseStore;
use super::file::JournaledFileStore;
use super::memory::MemoryStore;
use super::traits::UrlRepository;
use crate::config::{BackendKind, StorageConfig};
use crate::error::{ShortenerError, ShortenerResult};
use crate::keygen::{KeyGenerator, RandomKeyGenerator};
use std::sync::Arc;

/// Repository factory for creating repository instances
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create the backend selected by `config`
    ///
    /// # Errors
    /// Returns an error if:
    /// - the configuration is invalid
    /// - the journal cannot be opened
    /// - the database cannot be reached or its schema cannot be created
    pub async fn create(config: &StorageConfig) -> ShortenerResult<Arc<dyn UrlRepository>> {
        config.validate()?;
        let keygen: Arc<dyn KeyGenerator> = Arc::new(RandomKeyGenerator::new(config.key_length));
        Self::create_with_key_generator(config, keygen).await
    }

    /// Create the configured backend drawing keys from `keygen`
    pub async fn create_with_key_generator(
        config: &StorageConfig,
        keygen: Arc<dyn KeyGenerator>,
    ) -> ShortenerResult<Arc<dyn UrlRepository>> {
        let kind = config.backend_kind();
        tracing::info!(backend = kind.as_str(), "initializing storage backend");

        let repository: Arc<dyn UrlRepository> = match kind {
            BackendKind::Database => {
                let dsn = config.database_dsn.as_deref().ok_or_else(|| {
                    ShortenerError::ConfigError("database DSN missing".to_string())
                })?;
                let store = DatabaseStore::connect(dsn, config.max_connections)
                    .await?
                    .with_key_generator(keygen)
                    .with_ready_timeout(config.ready_timeout());
                Arc::new(store)
            }
            BackendKind::File => {
                let path = config.file_storage_path.clone().ok_or_else(|| {
                    ShortenerError::ConfigError("file storage path missing".to_string())
                })?;
                Arc::new(JournaledFileStore::open_with_key_generator(path, keygen).await?)
            }
            BackendKind::Memory => Arc::new(MemoryStore::with_key_generator(keygen)),
        };

        Ok(repository)
    }
}
