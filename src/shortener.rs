//! Repository façade
//!
//! [`Shortener`] owns the active backend and is the only entry point for
//! transport collaborators. Every operation honours the caller's
//! [`RequestContext`]: it fails fast when the context is already done and
//! stops waiting on the backend once the deadline passes.

use crate::config::StorageConfig;
use crate::context::RequestContext;
use crate::error::{ShortenerError, ShortenerResult};
use crate::models::{BatchRequest, BatchResponse, ResolvedUrl, ShortUrlRecord, User};
use crate::repository::{RepositoryFactory, UrlRepository};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// Uniform operation set over the configured backend
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct Shortener {
    repository: Arc<dyn UrlRepository>,
    base_url: Option<String>,
}

impl Shortener {
    /// Wrap an already constructed backend
    pub fn new(repository: Arc<dyn UrlRepository>) -> Self {
        Self {
            repository,
            base_url: None,
        }
    }

    /// Build the backend selected by `config`
    pub async fn from_config(config: &StorageConfig) -> ShortenerResult<Self> {
        let repository = RepositoryFactory::create(config).await?;
        let mut shortener = Self::new(repository);
        if let Some(base_url) = &config.base_url {
            shortener = shortener.with_base_url(base_url.clone());
        }
        Ok(shortener)
    }

    /// Prefix rendered short URLs with `base_url`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Name of the active backend
    pub fn backend(&self) -> &'static str {
        self.repository.backend()
    }

    /// Public URL for `short_key`
    pub fn short_url(&self, short_key: &str) -> String {
        match &self.base_url {
            Some(base_url) => format!("{}/{}", base_url, short_key),
            None => short_key.to_string(),
        }
    }

    /// Shorten one URL
    ///
    /// On `Conflict` the error carries the key issued earlier for this URL.
    pub async fn add(
        &self,
        ctx: &RequestContext,
        user: &User,
        original_url: &str,
    ) -> ShortenerResult<String> {
        ctx.check()?;
        validate_url(original_url)?;
        ctx.run(self.repository.add(user, original_url)).await
    }

    /// Shorten a batch of URLs, all or nothing
    pub async fn add_batch(
        &self,
        ctx: &RequestContext,
        user: &User,
        requests: &[BatchRequest],
    ) -> ShortenerResult<Vec<BatchResponse>> {
        ctx.check()?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let original_urls = requests
            .iter()
            .map(|request| validate_url(&request.original_url).map(|_| request.original_url.clone()))
            .collect::<ShortenerResult<Vec<String>>>()?;

        let keys = ctx
            .run(self.repository.add_batch(user, &original_urls))
            .await?;
        if keys.len() != requests.len() {
            return Err(ShortenerError::Internal(format!(
                "backend returned {} keys for {} URLs",
                keys.len(),
                requests.len()
            )));
        }

        Ok(requests
            .iter()
            .zip(keys)
            .map(|(request, short_key)| BatchResponse {
                correlation_id: request.correlation_id.clone(),
                short_url: self.short_url(&short_key),
                short_key,
            })
            .collect())
    }

    /// Resolve a key; pass `None` for anonymous redirects
    pub async fn get_by_short_name(
        &self,
        ctx: &RequestContext,
        user: Option<&User>,
        short_key: &str,
    ) -> ShortenerResult<ResolvedUrl> {
        ctx.check()?;
        ctx.run(self.repository.get_by_short_name(user, short_key))
            .await
    }

    /// Stream the user's records
    ///
    /// The context is re-checked before every element. The first error is
    /// yielded once and ends the stream; an expired context yields exactly
    /// one error and no records.
    pub fn get_all<'a>(
        &'a self,
        ctx: &'a RequestContext,
        user: &'a User,
    ) -> impl Stream<Item = ShortenerResult<ShortUrlRecord>> + Send + 'a {
        stream! {
            if let Err(e) = ctx.check() {
                yield Err(e);
                return;
            }

            let mut records = self.repository.get_all(user);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = ctx.done() => Err(ctx.err()),
                    item = records.next() => Ok(item),
                };

                match next {
                    Ok(Some(Ok(record))) => yield Ok(record),
                    Ok(Some(Err(e))) | Err(e) => {
                        tracing::debug!(user_id = %user.id, error = %e, "record stream aborted");
                        yield Err(e);
                        return;
                    }
                    Ok(None) => return,
                }
            }
        }
    }

    /// Collect [`Shortener::get_all`] into a vector, failing on the first error
    pub async fn list_all(
        &self,
        ctx: &RequestContext,
        user: &User,
    ) -> ShortenerResult<Vec<ShortUrlRecord>> {
        let stream = self.get_all(ctx, user);
        futures::pin_mut!(stream);

        let mut records = Vec::new();
        while let Some(item) = stream.next().await {
            records.push(item?);
        }
        Ok(records)
    }

    /// Soft-delete the user's records
    ///
    /// Only the database backend supports this; others return `Unsupported`.
    pub async fn remove_batch(
        &self,
        ctx: &RequestContext,
        user: &User,
        short_keys: &[String],
    ) -> ShortenerResult<()> {
        ctx.check()?;
        ctx.run(self.repository.remove_batch(user, short_keys))
            .await
    }

    /// Whether the backend can serve requests; false once the context is done
    pub async fn is_ready(&self, ctx: &RequestContext) -> bool {
        if ctx.check().is_err() {
            return false;
        }
        ctx.run(async { Ok(self.repository.is_ready().await) })
            .await
            .unwrap_or(false)
    }
}

fn validate_url(original_url: &str) -> ShortenerResult<()> {
    if original_url.trim().is_empty() {
        return Err(ShortenerError::InvalidUrl("empty URL".to_string()));
    }
    url::Url::parse(original_url)?;
    Ok(())
}
