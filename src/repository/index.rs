//! In-memory index shared by the memory and journal backends
//!
//! The index itself is not synchronized; owners wrap it in a
//! `tokio::sync::RwLock` and keep the whole check-then-insert sequence inside
//! one write guard.

use crate::error::{ShortenerError, ShortenerResult};
use crate::keygen::KeyGenerator;
use crate::models::{ResolvedUrl, ShortUrlRecord, User};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub(crate) struct UrlIndex {
    records: HashMap<String, ShortUrlRecord>,
    /// (owner, original URL) -> key
    by_owner_url: HashMap<(String, String), String>,
    /// Keys in insertion order
    order: Vec<String>,
}

impl UrlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn contains_key(&self, short_key: &str) -> bool {
        self.records.contains_key(short_key)
    }

    /// Key the user already holds for `original_url`
    pub fn find_key(&self, user: &User, original_url: &str) -> Option<&str> {
        self.owner_key(&user.id, original_url)
    }

    pub fn owner_key(&self, owner: &str, original_url: &str) -> Option<&str> {
        self.by_owner_url
            .get(&(owner.to_string(), original_url.to_string()))
            .map(String::as_str)
    }

    /// Insert or replace the record stored under its key
    pub fn insert(&mut self, record: ShortUrlRecord) {
        if let Some(previous) = self.records.get(&record.short_key) {
            if let Some(owner) = &previous.user_id {
                self.by_owner_url
                    .remove(&(owner.clone(), previous.original_url.clone()));
            }
        } else {
            self.order.push(record.short_key.clone());
        }

        if let Some(owner) = &record.user_id {
            self.by_owner_url.insert(
                (owner.clone(), record.original_url.clone()),
                record.short_key.clone(),
            );
        }
        self.records.insert(record.short_key.clone(), record);
    }

    /// Resolve a key; with a user, only that user's records match
    pub fn resolve(&self, user: Option<&User>, short_key: &str) -> ShortenerResult<ResolvedUrl> {
        let record = self
            .records
            .get(short_key)
            .filter(|record| user.map_or(true, |user| record.is_owned_by(user)))
            .ok_or_else(|| ShortenerError::NotFound(short_key.to_string()))?;

        Ok(ResolvedUrl {
            original_url: record.original_url.clone(),
            is_deleted: record.is_deleted,
        })
    }

    /// Snapshot of the user's live records in insertion order
    pub fn records_for(&self, user: &User) -> Vec<ShortUrlRecord> {
        self.order
            .iter()
            .filter_map(|key| self.records.get(key))
            .filter(|record| record.is_owned_by(user) && !record.is_deleted)
            .cloned()
            .collect()
    }

    /// Draw a key that is neither stored nor in `reserved`, re-rolling once
    pub fn allocate_key(
        &self,
        keygen: &dyn KeyGenerator,
        reserved: &HashSet<String>,
    ) -> ShortenerResult<String> {
        let taken = |key: &str| self.contains_key(key) || reserved.contains(key);

        let first = keygen.generate();
        if !taken(&first) {
            return Ok(first);
        }

        tracing::debug!(short_key = %first, "short key collision, re-rolling");
        let second = keygen.generate();
        if taken(&second) {
            return Err(ShortenerError::KeyCollision(second));
        }
        Ok(second)
    }

    /// Build the record for a single add without inserting it
    pub fn prepare_add(
        &self,
        user: &User,
        original_url: &str,
        keygen: &dyn KeyGenerator,
    ) -> ShortenerResult<ShortUrlRecord> {
        if let Some(existing) = self.find_key(user, original_url) {
            return Err(ShortenerError::Conflict {
                existing_key: existing.to_string(),
            });
        }
        let short_key = self.allocate_key(keygen, &HashSet::new())?;
        Ok(ShortUrlRecord::new(short_key, original_url, user))
    }

    /// Build the records for a whole batch without inserting any of them
    pub fn prepare_batch(
        &self,
        user: &User,
        original_urls: &[String],
        keygen: &dyn KeyGenerator,
    ) -> ShortenerResult<Vec<ShortUrlRecord>> {
        let mut seen_urls = HashSet::new();
        let mut reserved = HashSet::new();
        let mut records = Vec::with_capacity(original_urls.len());

        for original_url in original_urls {
            if self.find_key(user, original_url).is_some()
                || !seen_urls.insert(original_url.as_str())
            {
                return Err(ShortenerError::ValueAlreadyExists(original_url.clone()));
            }
            let short_key = self.allocate_key(keygen, &reserved)?;
            reserved.insert(short_key.clone());
            records.push(ShortUrlRecord::new(short_key, original_url.as_str(), user));
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::testing::ScriptedKeyGenerator;

    #[test]
    fn test_prepare_add_conflict() {
        let user = User::new("u1");
        let mut index = UrlIndex::new();
        index.insert(ShortUrlRecord::new("k1", "https://ex.com/a", &user));

        let gen = ScriptedKeyGenerator::new(["k2"]);
        let err = index
            .prepare_add(&user, "https://ex.com/a", &gen)
            .unwrap_err();
        assert_eq!(err.existing_key(), Some("k1"));

        // Another user gets a fresh record
        let other = index
            .prepare_add(&User::new("u2"), "https://ex.com/a", &gen)
            .unwrap();
        assert_eq!(other.short_key, "k2");
    }

    #[test]
    fn test_allocate_rerolls_once() {
        let user = User::new("u1");
        let mut index = UrlIndex::new();
        index.insert(ShortUrlRecord::new("taken", "https://ex.com/a", &user));

        let gen = ScriptedKeyGenerator::new(["taken", "fresh"]);
        assert_eq!(index.allocate_key(&gen, &HashSet::new()).unwrap(), "fresh");

        let gen = ScriptedKeyGenerator::new(["taken", "taken"]);
        assert!(matches!(
            index.allocate_key(&gen, &HashSet::new()),
            Err(ShortenerError::KeyCollision(_))
        ));
    }

    #[test]
    fn test_prepare_batch_rejects_internal_duplicate() {
        let index = UrlIndex::new();
        let gen = ScriptedKeyGenerator::new(["a1", "a2", "a3"]);
        let urls = vec![
            "https://ex.com/1".to_string(),
            "https://ex.com/2".to_string(),
            "https://ex.com/1".to_string(),
        ];
        let result = index.prepare_batch(&User::new("u1"), &urls, &gen);
        assert!(matches!(
            result,
            Err(ShortenerError::ValueAlreadyExists(url)) if url == "https://ex.com/1"
        ));
    }

    #[test]
    fn test_resolve_scoping() {
        let owner = User::new("u1");
        let mut index = UrlIndex::new();
        index.insert(ShortUrlRecord::new("k1", "https://ex.com/a", &owner));

        assert!(index.resolve(None, "k1").is_ok());
        assert!(index.resolve(Some(&owner), "k1").is_ok());
        assert!(matches!(
            index.resolve(Some(&User::new("u2")), "k1"),
            Err(ShortenerError::NotFound(_))
        ));
        assert!(matches!(
            index.resolve(None, "missing"),
            Err(ShortenerError::NotFound(_))
        ));
    }

    #[test]
    fn test_replacing_key_updates_owner_lookup() {
        let user = User::new("u1");
        let mut index = UrlIndex::new();
        index.insert(ShortUrlRecord::new("k1", "https://ex.com/a", &user));
        index.insert(ShortUrlRecord::new("k1", "https://ex.com/b", &user));

        assert_eq!(index.len(), 1);
        assert!(index.find_key(&user, "https://ex.com/a").is_none());
        assert_eq!(index.find_key(&user, "https://ex.com/b"), Some("k1"));
        assert_eq!(index.records_for(&user).len(), 1);
    }
}
