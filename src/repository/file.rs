//! Append-only journal backend
//!
//! The journal is newline-delimited JSON, one [`JournalEntry`] per line. It is
//! replayed into an in-memory index on open, and every successful write
//! appends to it before the index changes.
//!
//! Write sections run on a spawned task, so a caller that stops waiting
//! (deadline, cancellation) never leaves a journaled record out of the index.
//! A failed append truncates the journal back to its previous length.

use super::index::UrlIndex;
use super::traits::{RecordStream, UrlRepository};
use crate::error::{ShortenerError, ShortenerResult};
use crate::keygen::{KeyGenerator, RandomKeyGenerator};
use crate::models::{JournalEntry, ResolvedUrl, ShortUrlRecord, User};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;

struct JournalState {
    index: UrlIndex,
    /// `None` once the store has been closed
    writer: Option<File>,
}

/// File-backed store that survives restarts by replaying its journal
pub struct JournaledFileStore {
    path: PathBuf,
    state: Arc<RwLock<JournalState>>,
    keygen: Arc<dyn KeyGenerator>,
}

impl JournaledFileStore {
    /// Open (or create) the journal at `path` and replay it
    pub async fn open(path: impl Into<PathBuf>) -> ShortenerResult<Self> {
        Self::open_with_key_generator(path, Arc::new(RandomKeyGenerator::default())).await
    }

    /// Open the journal, drawing new keys from `keygen`
    pub async fn open_with_key_generator(
        path: impl Into<PathBuf>,
        keygen: Arc<dyn KeyGenerator>,
    ) -> ShortenerResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let index = replay(&path).await?;
        let mut writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        seal_torn_tail(&path, &mut writer).await?;

        tracing::info!(
            backend = "file",
            path = %path.display(),
            records = index.len(),
            "journal loaded"
        );

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(JournalState {
                index,
                writer: Some(writer),
            })),
            keygen,
        })
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in the index
    pub async fn len(&self) -> usize {
        self.state.read().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Flush and release the journal handle; later writes fail
    pub async fn close(&self) -> ShortenerResult<()> {
        let mut state = self.state.write().await;
        if let Some(mut writer) = state.writer.take() {
            writer.flush().await?;
            writer.sync_all().await?;
            tracing::info!(backend = "file", path = %self.path.display(), "journal closed");
        }
        Ok(())
    }
}

/// Rebuild the index from the journal
///
/// Lines that do not parse are skipped. When an owner has several lines for
/// the same URL the first one wins.
async fn replay(path: &Path) -> ShortenerResult<UrlIndex> {
    let mut index = UrlIndex::new();

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => {
                let record = ShortUrlRecord::from(entry);
                let duplicate = record
                    .user_id
                    .as_deref()
                    .and_then(|owner| index.owner_key(owner, &record.original_url));
                if let Some(existing_key) = duplicate {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no,
                        short_key = %record.short_key,
                        existing_key = %existing_key,
                        "skipping duplicate journal entry for an already shortened URL"
                    );
                    continue;
                }
                index.insert(record);
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %e,
                    "skipping malformed journal line"
                );
            }
        }
    }

    Ok(index)
}

/// Terminate a last line left without its newline by an interrupted write
async fn seal_torn_tail(path: &Path, writer: &mut File) -> ShortenerResult<()> {
    let len = writer.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }

    let mut reader = File::open(path).await?;
    reader.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    reader.read_exact(&mut last).await?;
    if last[0] != b'\n' {
        tracing::warn!(path = %path.display(), "journal ends mid-line, terminating it");
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Append one line per record and flush
///
/// On failure the file is truncated back to its previous length so no
/// partial line is left for the next append to run into.
async fn append(writer: &mut File, records: &[ShortUrlRecord]) -> ShortenerResult<()> {
    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, &JournalEntry::from(record))?;
        buf.push(b'\n');
    }

    let start = writer.metadata().await?.len();
    let written: std::io::Result<()> = async {
        writer.write_all(&buf).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = written {
        if let Err(truncate_err) = writer.set_len(start).await {
            tracing::error!(
                error = %truncate_err,
                "failed to roll back partial journal write"
            );
        }
        return Err(e.into());
    }
    Ok(())
}

/// Run a write section to completion even if the caller stops waiting
async fn run_detached<T, F>(section: F) -> ShortenerResult<T>
where
    F: Future<Output = ShortenerResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(section)
        .await
        .map_err(|e| ShortenerError::Internal(format!("journal write task failed: {}", e)))?
}

#[async_trait]
impl UrlRepository for JournaledFileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn add(&self, user: &User, original_url: &str) -> ShortenerResult<String> {
        let state = Arc::clone(&self.state);
        let keygen = Arc::clone(&self.keygen);
        let user = user.clone();
        let original_url = original_url.to_string();

        run_detached(async move {
            let mut guard = state.write().await;
            let JournalState { index, writer } = &mut *guard;

            let record = index.prepare_add(&user, &original_url, keygen.as_ref())?;
            let writer = writer.as_mut().ok_or(ShortenerError::StorageNotInitialized)?;
            append(writer, std::slice::from_ref(&record)).await?;

            let short_key = record.short_key.clone();
            index.insert(record);

            tracing::debug!(backend = "file", user_id = %user.id, short_key = %short_key, "stored short URL");
            Ok(short_key)
        })
        .await
    }

    async fn add_batch(
        &self,
        user: &User,
        original_urls: &[String],
    ) -> ShortenerResult<Vec<String>> {
        let state = Arc::clone(&self.state);
        let keygen = Arc::clone(&self.keygen);
        let user = user.clone();
        let original_urls = original_urls.to_vec();

        run_detached(async move {
            let mut guard = state.write().await;
            let JournalState { index, writer } = &mut *guard;

            let records = index.prepare_batch(&user, &original_urls, keygen.as_ref())?;
            let writer = writer.as_mut().ok_or(ShortenerError::StorageNotInitialized)?;
            append(writer, &records).await?;

            let keys: Vec<String> = records.iter().map(|r| r.short_key.clone()).collect();
            for record in records {
                index.insert(record);
            }

            tracing::debug!(backend = "file", user_id = %user.id, count = keys.len(), "stored batch");
            Ok(keys)
        })
        .await
    }

    async fn get_by_short_name(
        &self,
        user: Option<&User>,
        short_key: &str,
    ) -> ShortenerResult<ResolvedUrl> {
        self.state.read().await.index.resolve(user, short_key)
    }

    fn get_all<'a>(&'a self, user: &'a User) -> RecordStream<'a> {
        let records = stream! {
            let snapshot = self.state.read().await.index.records_for(user);
            for record in snapshot {
                yield Ok(record);
            }
        };
        records.boxed()
    }

    async fn is_ready(&self) -> bool {
        self.state.read().await.writer.is_some()
    }
}
