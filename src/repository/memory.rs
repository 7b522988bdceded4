//! Volatile in-process backend

use super::index::UrlIndex;
use super::traits::{RecordStream, UrlRepository};
use crate::error::ShortenerResult;
use crate::keygen::{KeyGenerator, RandomKeyGenerator};
use crate::models::{ResolvedUrl, User};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Short URLs kept in a map for the lifetime of the process
pub struct MemoryStore {
    index: RwLock<UrlIndex>,
    keygen: Arc<dyn KeyGenerator>,
}

impl MemoryStore {
    /// Create an empty store with the default key generator
    pub fn new() -> Self {
        Self::with_key_generator(Arc::new(RandomKeyGenerator::default()))
    }

    /// Create an empty store drawing keys from `keygen`
    pub fn with_key_generator(keygen: Arc<dyn KeyGenerator>) -> Self {
        Self {
            index: RwLock::new(UrlIndex::new()),
            keygen,
        }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlRepository for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, user: &User, original_url: &str) -> ShortenerResult<String> {
        let mut index = self.index.write().await;
        let record = index.prepare_add(user, original_url, self.keygen.as_ref())?;
        let short_key = record.short_key.clone();
        index.insert(record);

        tracing::debug!(backend = "memory", user_id = %user.id, short_key = %short_key, "stored short URL");
        Ok(short_key)
    }

    async fn add_batch(
        &self,
        user: &User,
        original_urls: &[String],
    ) -> ShortenerResult<Vec<String>> {
        let mut index = self.index.write().await;
        let records = index.prepare_batch(user, original_urls, self.keygen.as_ref())?;
        let keys: Vec<String> = records.iter().map(|r| r.short_key.clone()).collect();
        for record in records {
            index.insert(record);
        }

        tracing::debug!(backend = "memory", user_id = %user.id, count = keys.len(), "stored batch");
        Ok(keys)
    }

    async fn get_by_short_name(
        &self,
        user: Option<&User>,
        short_key: &str,
    ) -> ShortenerResult<ResolvedUrl> {
        self.index.read().await.resolve(user, short_key)
    }

    fn get_all<'a>(&'a self, user: &'a User) -> RecordStream<'a> {
        let records = stream! {
            let snapshot = self.index.read().await.records_for(user);
            for record in snapshot {
                yield Ok(record);
            }
        };
        records.boxed()
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShortenerError;
    use crate::keygen::testing::ScriptedKeyGenerator;

    #[tokio::test]
    async fn test_add_and_get() {
        let store = MemoryStore::new();
        let user = User::new("u1");

        let key = store.add(&user, "https://ex.com/a").await.unwrap();
        let resolved = store.get_by_short_name(Some(&user), &key).await.unwrap();
        assert_eq!(resolved.original_url, "https://ex.com/a");
        assert!(!resolved.is_deleted);

        // Anonymous resolution ignores the owner
        let resolved = store.get_by_short_name(None, &key).await.unwrap();
        assert_eq!(resolved.original_url, "https://ex.com/a");
    }

    #[tokio::test]
    async fn test_repeated_add_conflicts_with_same_key() {
        let store = MemoryStore::new();
        let user = User::new("u1");

        let first = store.add(&user, "https://ex.com/a").await.unwrap();
        let err = store.add(&user, "https://ex.com/a").await.unwrap_err();
        assert_eq!(err.existing_key(), Some(first.as_str()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_scoped_per_user() {
        let store = MemoryStore::new();
        let k1 = store.add(&User::new("u1"), "https://ex.com/a").await.unwrap();
        let k2 = store.add(&User::new("u2"), "https://ex.com/a").await.unwrap();
        assert_ne!(k1, k2);
    }

    #[tokio::test]
    async fn test_unknown_key_not_found() {
        let store = MemoryStore::new();
        let result = store.get_by_short_name(Some(&User::new("u1")), "nope").await;
        assert!(matches!(result, Err(ShortenerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_collision_rerolled() {
        let keygen = Arc::new(ScriptedKeyGenerator::new(["dup00000", "dup00000", "new00000"]));
        let store = MemoryStore::with_key_generator(keygen);
        let user = User::new("u1");

        assert_eq!(store.add(&user, "https://ex.com/a").await.unwrap(), "dup00000");
        assert_eq!(store.add(&user, "https://ex.com/b").await.unwrap(), "new00000");
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let user = User::new("u1");
        let urls = vec![
            "https://ex.com/1".to_string(),
            "https://ex.com/2".to_string(),
            "https://ex.com/1".to_string(),
        ];

        let result = store.add_batch(&user, &urls).await;
        assert!(matches!(result, Err(ShortenerError::ValueAlreadyExists(_))));
        assert!(store.is_empty().await);

        let keys = store.add_batch(&user, &urls[..2]).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_get_all_only_returns_callers_records() {
        let store = MemoryStore::new();
        let user = User::new("u1");
        store.add(&user, "https://ex.com/1").await.unwrap();
        store.add(&user, "https://ex.com/2").await.unwrap();
        store.add(&User::new("u2"), "https://ex.com/3").await.unwrap();

        let records: Vec<_> = store.get_all(&user).collect().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.as_ref().unwrap().is_owned_by(&user)));
    }

    #[tokio::test]
    async fn test_remove_batch_unsupported() {
        let store = MemoryStore::new();
        let result = store.remove_batch(&User::new("u1"), &[]).await;
        assert!(matches!(result, Err(ShortenerError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_adds_store_one_record() {
        let store = Arc::new(MemoryStore::new());
        let user = User::new("u1");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let user = user.clone();
                tokio::spawn(async move { store.add(&user, "https://ex.com/race").await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len().await, 1);
    }
}
