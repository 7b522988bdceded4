//! Repository trait definitions
//!
//! Every storage backend implements [`UrlRepository`]. Operations a backend
//! cannot honour return [`ShortenerError::Unsupported`] rather than silently
//! doing nothing.

use crate::error::{ShortenerError, ShortenerResult};
use crate::models::{ResolvedUrl, ShortUrlRecord, User};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy sequence of a user's records; ends after the first error
pub type RecordStream<'a> = BoxStream<'a, ShortenerResult<ShortUrlRecord>>;

/// Storage contract for short URLs
///
/// Implementations can use different storage backends (memory, file, database)
#[async_trait]
pub trait UrlRepository: Send + Sync {
    /// Short backend name used in logs and errors
    fn backend(&self) -> &'static str;

    /// Shorten `original_url` for `user`
    ///
    /// Returns `Conflict` carrying the existing key if the user already
    /// shortened this URL.
    async fn add(&self, user: &User, original_url: &str) -> ShortenerResult<String>;

    /// Shorten every URL in `original_urls`, all or nothing
    ///
    /// Keys are returned in input order. A URL the user already owns, or one
    /// repeated inside the batch, fails the whole call with
    /// `ValueAlreadyExists` and stores nothing.
    async fn add_batch(&self, user: &User, original_urls: &[String])
        -> ShortenerResult<Vec<String>>;

    /// Resolve a key, scoped to `user` when one is given
    async fn get_by_short_name(
        &self,
        user: Option<&User>,
        short_key: &str,
    ) -> ShortenerResult<ResolvedUrl>;

    /// Stream the user's live records
    fn get_all<'a>(&'a self, user: &'a User) -> RecordStream<'a>;

    /// Soft-delete the user's records with the given keys
    async fn remove_batch(&self, _user: &User, _short_keys: &[String]) -> ShortenerResult<()> {
        Err(ShortenerError::Unsupported {
            backend: self.backend(),
            operation: "remove_batch",
        })
    }

    /// Whether the backend can currently serve requests
    async fn is_ready(&self) -> bool;
}
