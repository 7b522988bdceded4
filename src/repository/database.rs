//! Relational backend on an `sqlx` SQLite pool
//!
//! Uniqueness is enforced by the partial unique indexes in [`super::schema`];
//! batches run inside a single transaction.

use super::schema::apply_schema;
use super::traits::{RecordStream, UrlRepository};
use crate::error::{ShortenerError, ShortenerResult};
use crate::keygen::{KeyGenerator, RandomKeyGenerator};
use crate::models::{ResolvedUrl, ShortUrlRecord, User};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for the readiness ping
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(1);

// Inserts only when the key is free for every owner, so anonymous lookups
// stay unambiguous. Owner-level uniqueness is left to the unique indexes.
const INSERT_SQL: &str = "INSERT INTO short_urls (user_id, short_key, original_url) \
     SELECT $1, $2, $3 WHERE NOT EXISTS \
     (SELECT 1 FROM short_urls WHERE short_key = $2 AND is_deleted = 0)";

const FIND_KEY_SQL: &str = "SELECT short_key FROM short_urls \
     WHERE user_id = $1 AND original_url = $2 AND is_deleted = 0 LIMIT 1";

const RESOLVE_SQL: &str = "SELECT original_url, is_deleted FROM short_urls \
     WHERE short_key = $1 ORDER BY is_deleted ASC, id ASC LIMIT 1";

const RESOLVE_OWNED_SQL: &str = "SELECT original_url, is_deleted FROM short_urls \
     WHERE short_key = $1 AND user_id = $2 ORDER BY is_deleted ASC, id ASC LIMIT 1";

const LIST_SQL: &str = "SELECT short_key, original_url, user_id, is_deleted FROM short_urls \
     WHERE user_id = $1 AND is_deleted = 0 ORDER BY id ASC";

const SOFT_DELETE_SQL: &str = "UPDATE short_urls SET is_deleted = 1 \
     WHERE user_id = $1 AND short_key = $2 AND is_deleted = 0";

#[derive(Debug, sqlx::FromRow)]
struct ShortUrlRow {
    short_key: String,
    original_url: String,
    user_id: String,
    is_deleted: bool,
}

impl From<ShortUrlRow> for ShortUrlRecord {
    fn from(row: ShortUrlRow) -> Self {
        Self {
            short_key: row.short_key,
            original_url: row.original_url,
            user_id: Some(row.user_id),
            is_deleted: row.is_deleted,
        }
    }
}

/// Outcome of one insert attempt
enum InsertOutcome {
    Inserted,
    /// Another owner already uses this key
    KeyTaken,
    /// A unique index rejected the row
    Violation,
}

async fn insert_row(
    conn: &mut SqliteConnection,
    user: &User,
    short_key: &str,
    original_url: &str,
) -> ShortenerResult<InsertOutcome> {
    let result = sqlx::query(INSERT_SQL)
        .bind(&user.id)
        .bind(short_key)
        .bind(original_url)
        .execute(&mut *conn)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => Ok(InsertOutcome::KeyTaken),
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(InsertOutcome::Violation)
        }
        Err(e) => Err(e.into()),
    }
}

async fn find_live_key(
    conn: &mut SqliteConnection,
    user: &User,
    original_url: &str,
) -> ShortenerResult<Option<String>> {
    let key = sqlx::query_scalar::<_, String>(FIND_KEY_SQL)
        .bind(&user.id)
        .bind(original_url)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(key)
}

fn is_in_memory(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

/// Database-backed store; the only backend with soft delete
pub struct DatabaseStore {
    pool: SqlitePool,
    keygen: Arc<dyn KeyGenerator>,
    ready_timeout: Duration,
    /// Read listings fully before yielding, so a stream being consumed does
    /// not hold the pool's only connection
    buffered_listing: bool,
}

impl DatabaseStore {
    /// Connect to `dsn` and bootstrap the schema
    ///
    /// In-memory DSNs get a single pinned connection. Their listings are read
    /// in full before the first record is yielded, so other calls can run
    /// while a [`UrlRepository::get_all`] stream is still being consumed.
    ///
    /// # Errors
    /// - `ConfigError` if the DSN cannot be parsed
    /// - `Schema` if the tables or indexes cannot be created
    pub async fn connect(dsn: &str, max_connections: u32) -> ShortenerResult<Self> {
        if !dsn.starts_with("sqlite:") {
            return Err(ShortenerError::ConfigError(format!(
                "unsupported database DSN scheme: {}",
                dsn.split(':').next().unwrap_or_default()
            )));
        }
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| ShortenerError::ConfigError(format!("invalid database DSN: {}", e)))?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own database,
        // so keep exactly one and never recycle it.
        let pool_options = if is_in_memory(dsn) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        let mut store = Self::from_pool(pool).await?;
        store.buffered_listing = is_in_memory(dsn);
        Ok(store)
    }

    /// Wrap an existing pool, bootstrapping the schema
    pub async fn from_pool(pool: SqlitePool) -> ShortenerResult<Self> {
        apply_schema(&pool).await?;
        tracing::info!(backend = "database", "schema ready");

        Ok(Self {
            pool,
            keygen: Arc::new(RandomKeyGenerator::default()),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            buffered_listing: false,
        })
    }

    /// Draw keys from `keygen`
    pub fn with_key_generator(mut self, keygen: Arc<dyn KeyGenerator>) -> Self {
        self.keygen = keygen;
        self
    }

    /// Set the readiness ping timeout
    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl UrlRepository for DatabaseStore {
    fn backend(&self) -> &'static str {
        "database"
    }

    async fn add(&self, user: &User, original_url: &str) -> ShortenerResult<String> {
        let mut conn = self.pool.acquire().await?;
        let mut short_key = self.keygen.generate();
        for attempt in 0..2 {
            if attempt > 0 {
                tracing::debug!(backend = "database", short_key = %short_key, "short key collision, re-rolling");
                short_key = self.keygen.generate();
            }

            match insert_row(&mut conn, user, &short_key, original_url).await? {
                InsertOutcome::Inserted => {
                    tracing::debug!(backend = "database", user_id = %user.id, short_key = %short_key, "stored short URL");
                    return Ok(short_key);
                }
                InsertOutcome::KeyTaken => continue,
                InsertOutcome::Violation => {
                    if let Some(existing_key) = find_live_key(&mut conn, user, original_url).await? {
                        return Err(ShortenerError::Conflict { existing_key });
                    }
                    // The owner's key index fired, not the URL index
                }
            }
        }
        Err(ShortenerError::KeyCollision(short_key))
    }

    async fn add_batch(
        &self,
        user: &User,
        original_urls: &[String],
    ) -> ShortenerResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut keys = Vec::with_capacity(original_urls.len());

        for original_url in original_urls {
            let mut short_key = self.keygen.generate();
            let mut outcome = insert_row(&mut *tx, user, &short_key, original_url).await?;
            if matches!(outcome, InsertOutcome::KeyTaken) {
                short_key = self.keygen.generate();
                outcome = insert_row(&mut *tx, user, &short_key, original_url).await?;
            }

            match outcome {
                InsertOutcome::Inserted => keys.push(short_key),
                InsertOutcome::KeyTaken => {
                    tx.rollback().await?;
                    return Err(ShortenerError::KeyCollision(short_key));
                }
                InsertOutcome::Violation => {
                    tx.rollback().await?;
                    tracing::debug!(backend = "database", user_id = %user.id, "batch rolled back on duplicate");
                    return Err(ShortenerError::ValueAlreadyExists(original_url.clone()));
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(backend = "database", user_id = %user.id, count = keys.len(), "stored batch");
        Ok(keys)
    }

    async fn get_by_short_name(
        &self,
        user: Option<&User>,
        short_key: &str,
    ) -> ShortenerResult<ResolvedUrl> {
        let row = match user {
            Some(user) => {
                sqlx::query_as::<_, (String, bool)>(RESOLVE_OWNED_SQL)
                    .bind(short_key)
                    .bind(&user.id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, (String, bool)>(RESOLVE_SQL)
                    .bind(short_key)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        let (original_url, is_deleted) =
            row.ok_or_else(|| ShortenerError::NotFound(short_key.to_string()))?;
        Ok(ResolvedUrl {
            original_url,
            is_deleted,
        })
    }

    fn get_all<'a>(&'a self, user: &'a User) -> RecordStream<'a> {
        let query = sqlx::query_as::<_, ShortUrlRow>(LIST_SQL).bind(user.id.as_str());
        if !self.buffered_listing {
            return query
                .fetch(&self.pool)
                .map(|row| row.map(ShortUrlRecord::from).map_err(ShortenerError::from))
                .boxed();
        }

        let records = stream! {
            match query.fetch_all(&self.pool).await {
                Ok(rows) => {
                    for row in rows {
                        yield Ok(ShortUrlRecord::from(row));
                    }
                }
                Err(e) => {
                    yield Err(ShortenerError::from(e));
                }
            }
        };
        records.boxed()
    }

    async fn remove_batch(&self, user: &User, short_keys: &[String]) -> ShortenerResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for short_key in short_keys {
            removed += sqlx::query(SOFT_DELETE_SQL)
                .bind(&user.id)
                .bind(short_key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        tracing::debug!(
            backend = "database",
            user_id = %user.id,
            requested = short_keys.len(),
            removed,
            "soft-deleted short URLs"
        );
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        if self.pool.is_closed() {
            return false;
        }
        let ping = sqlx::query("SELECT 1").execute(&self.pool);
        match tokio::time::timeout(self.ready_timeout, ping).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(backend = "database", error = %e, "readiness ping failed");
                false
            }
            Err(_) => {
                tracing::warn!(backend = "database", "readiness ping timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::testing::ScriptedKeyGenerator;
    use tempfile::TempDir;

    async fn memory_store() -> DatabaseStore {
        DatabaseStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    async fn row_count(store: &DatabaseStore) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM short_urls")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let store = memory_store().await;
        apply_schema(store.pool()).await.unwrap();
        apply_schema(store.pool()).await.unwrap();
        assert_eq!(row_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_add_conflict_returns_existing_key() {
        let store = memory_store().await;
        let user = User::new("u1");

        let k1 = store.add(&user, "https://ex.com/a").await.unwrap();
        let err = store.add(&user, "https://ex.com/a").await.unwrap_err();
        assert_eq!(err.existing_key(), Some(k1.as_str()));

        let k2 = store.add(&User::new("u2"), "https://ex.com/a").await.unwrap();
        assert_ne!(k1, k2);
        assert_eq!(row_count(&store).await, 2);
    }

    #[tokio::test]
    async fn test_key_taken_by_other_owner_is_rerolled() {
        let keygen = Arc::new(ScriptedKeyGenerator::new(["same0000", "same0000", "next0000"]));
        let store = memory_store().await.with_key_generator(keygen);

        let k1 = store.add(&User::new("u1"), "https://ex.com/a").await.unwrap();
        let k2 = store.add(&User::new("u2"), "https://ex.com/b").await.unwrap();
        assert_eq!(k1, "same0000");
        assert_eq!(k2, "next0000");
    }

    #[tokio::test]
    async fn test_second_collision_fails() {
        let keygen = Arc::new(ScriptedKeyGenerator::new([
            "same0000", "same0000", "same0000",
        ]));
        let store = memory_store().await.with_key_generator(keygen);

        store.add(&User::new("u1"), "https://ex.com/a").await.unwrap();
        let result = store.add(&User::new("u2"), "https://ex.com/b").await;
        assert!(matches!(result, Err(ShortenerError::KeyCollision(_))));
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_commits_nothing() {
        let store = memory_store().await;
        let user = User::new("u1");
        let urls = vec![
            "https://ex.com/1".to_string(),
            "https://ex.com/2".to_string(),
            "https://ex.com/1".to_string(),
        ];

        let result = store.add_batch(&user, &urls).await;
        assert!(matches!(result, Err(ShortenerError::ValueAlreadyExists(_))));
        assert_eq!(row_count(&store).await, 0);

        let keys = store.add_batch(&user, &urls[..2]).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(row_count(&store).await, 2);
    }

    #[tokio::test]
    async fn test_remove_batch_soft_deletes() {
        let store = memory_store().await;
        let user = User::new("u1");
        let key = store.add(&user, "https://ex.com/a").await.unwrap();

        // Another user cannot delete it
        store
            .remove_batch(&User::new("u2"), &[key.clone()])
            .await
            .unwrap();
        assert!(!store.get_by_short_name(None, &key).await.unwrap().is_deleted);

        store
            .remove_batch(&user, &[key.clone(), "missing0".to_string()])
            .await
            .unwrap();
        let resolved = store.get_by_short_name(Some(&user), &key).await.unwrap();
        assert!(resolved.is_deleted);
        assert_eq!(resolved.original_url, "https://ex.com/a");

        // Deleted records leave the listing and free the URL for re-adding
        let listed: Vec<_> = store.get_all(&user).collect().await;
        assert!(listed.is_empty());
        let again = store.add(&user, "https://ex.com/a").await.unwrap();
        assert_ne!(again, key);
    }

    #[tokio::test]
    async fn test_get_by_short_name_not_found() {
        let store = memory_store().await;
        let result = store
            .get_by_short_name(Some(&User::new("u1")), "missing0")
            .await;
        assert!(matches!(result, Err(ShortenerError::NotFound(_))));

        let key = store.add(&User::new("u1"), "https://ex.com/a").await.unwrap();
        let result = store.get_by_short_name(Some(&User::new("u2")), &key).await;
        assert!(matches!(result, Err(ShortenerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_all_streams_in_insert_order() {
        let store = memory_store().await;
        let user = User::new("u1");
        for i in 0..3 {
            store.add(&user, &format!("https://ex.com/{}", i)).await.unwrap();
        }
        store.add(&User::new("u2"), "https://ex.com/x").await.unwrap();

        let records: Vec<ShortUrlRecord> = store
            .get_all(&user)
            .map(|r| r.unwrap())
            .collect()
            .await;
        let urls: Vec<&str> = records.iter().map(|r| r.original_url.as_str()).collect();
        assert_eq!(urls, ["https://ex.com/0", "https://ex.com/1", "https://ex.com/2"]);
    }

    #[tokio::test]
    async fn test_ready_until_closed() {
        let store = memory_store().await;
        assert!(store.is_ready().await);
        store.close().await;
        assert!(!store.is_ready().await);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let temp_dir = TempDir::new().unwrap();
        let dsn = format!("sqlite://{}", temp_dir.path().join("urls.db").display());
        let user = User::new("u1");

        let key = {
            let store = DatabaseStore::connect(&dsn, 2).await.unwrap();
            let key = store.add(&user, "https://ex.com/a").await.unwrap();
            store.close().await;
            key
        };

        let store = DatabaseStore::connect(&dsn, 2).await.unwrap();
        let resolved = store.get_by_short_name(Some(&user), &key).await.unwrap();
        assert_eq!(resolved.original_url, "https://ex.com/a");
    }

    #[tokio::test]
    async fn test_invalid_dsn_rejected() {
        let result = DatabaseStore::connect("postgres://not-sqlite", 1).await;
        assert!(matches!(result, Err(ShortenerError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_in_memory_listing_releases_connection() {
        let store = memory_store().await;
        let user = User::new("u1");
        let first = store.add(&user, "https://ex.com/0").await.unwrap();
        store.add(&user, "https://ex.com/1").await.unwrap();

        let mut records = store.get_all(&user);
        let head = records.next().await.unwrap().unwrap();
        assert_eq!(head.short_key, first);

        // The only connection is free while the stream is still open
        let resolved = tokio::time::timeout(
            Duration::from_secs(1),
            store.get_by_short_name(Some(&user), &first),
        )
        .await
        .expect("lookup blocked by open listing")
        .unwrap();
        assert_eq!(resolved.original_url, "https://ex.com/0");

        assert!(records.next().await.unwrap().is_ok());
        assert!(records.next().await.is_none());
    }
}
