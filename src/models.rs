//! Records and value types shared by every backend

use serde::{Deserialize, Serialize};

/// Caller identity supplied by the authentication collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A stored short URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrlRecord {
    pub short_key: String,
    pub original_url: String,
    /// Owner of the record. `None` for journal entries written without one.
    pub user_id: Option<String>,
    pub is_deleted: bool,
}

impl ShortUrlRecord {
    pub fn new(
        short_key: impl Into<String>,
        original_url: impl Into<String>,
        user: &User,
    ) -> Self {
        Self {
            short_key: short_key.into(),
            original_url: original_url.into(),
            user_id: Some(user.id.clone()),
            is_deleted: false,
        }
    }

    /// Whether this record belongs to `user`
    pub fn is_owned_by(&self, user: &User) -> bool {
        self.user_id.as_deref() == Some(user.id.as_str())
    }
}

/// Result of resolving a short key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub original_url: String,
    pub is_deleted: bool,
}

/// One element of a batch shortening request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchRequest {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

/// One element of a batch shortening response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub correlation_id: String,
    pub short_key: String,
    pub short_url: String,
}

/// One line of the append-only journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl From<&ShortUrlRecord> for JournalEntry {
    fn from(record: &ShortUrlRecord) -> Self {
        Self {
            id: record.short_key.clone(),
            url: record.original_url.clone(),
            user_id: record.user_id.clone(),
        }
    }
}

impl From<JournalEntry> for ShortUrlRecord {
    fn from(entry: JournalEntry) -> Self {
        Self {
            short_key: entry.id,
            original_url: entry.url,
            user_id: entry.user_id,
            is_deleted: false,
        }
    }
}
