//! URL shortening storage
//!
//! Translates long URLs into short keys per user and stores them in one of
//! three backends chosen by [`StorageConfig`]: an in-process map, an
//! append-only JSON-lines journal, or an SQL database.
//!
//! ```no_run
//! use shortener_lib::{RequestContext, Shortener, StorageConfig, User};
//! use std::time::Duration;
//!
//! # async fn demo() -> shortener_lib::ShortenerResult<()> {
//! let shortener = Shortener::from_config(&StorageConfig::from_env()?).await?;
//! let ctx = RequestContext::with_timeout(Duration::from_secs(2));
//! let key = shortener.add(&ctx, &User::new("u1"), "https://example.com/a").await?;
//! let resolved = shortener.get_by_short_name(&ctx, None, &key).await?;
//! assert_eq!(resolved.original_url, "https://example.com/a");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod config_builder;
pub mod context;
pub mod error;
pub mod keygen;
pub mod logger;
pub mod models;
pub mod repository;
pub mod shortener;

pub use config::{BackendKind, StorageConfig};
pub use config_builder::StorageConfigBuilder;
pub use context::RequestContext;
pub use error::{ErrorKind, ShortenerError, ShortenerResult};
pub use keygen::{KeyGenerator, RandomKeyGenerator};
pub use models::{BatchRequest, BatchResponse, JournalEntry, ResolvedUrl, ShortUrlRecord, User};
pub use repository::{
    DatabaseStore, JournaledFileStore, MemoryStore, RepositoryFactory, UrlRepository,
};
pub use shortener::Shortener;
