use crate::deletion::{DeleteQueue, DEFAULT_QUEUE_CAPACITY};
use crate::error::{Result, ShortenerError};
use snip_core::{Lookup, Repository, ShortKey, ShortUrl, StorageError, StorageStats, UserUrl};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceSettings {
    /// Public prefix prepended to keys in responses.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    base_url: String,
    /// Requests the delete queue buffers before `delete` waits.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    delete_queue_capacity: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Result of shortening one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub key: ShortKey,
    /// `base_url/key`.
    pub short_url: String,
    /// The URL was already stored; the key is the existing one.
    pub conflict: bool,
}

/// One entry of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// One entry of a batch shorten response, paired by `correlation_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub key: ShortKey,
    pub short_url: String,
    pub conflict: bool,
}

/// The operations a transport layer drives.
///
/// Wraps the single active [`Repository`] and owns the soft-delete
/// pipeline. Deletes are acknowledged once queued; call
/// [`shutdown`](ShortenerService::shutdown) before exiting so queued deletes
/// are applied.
#[derive(Debug)]
pub struct ShortenerService<R: ?Sized> {
    repository: Arc<R>,
    deletions: DeleteQueue,
    base_url: String,
}

impl<R: Repository + ?Sized> ShortenerService<R> {
    /// Creates the service and starts its delete worker.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(repository: Arc<R>, settings: ServiceSettings) -> Self {
        let deletions = DeleteQueue::spawn(Arc::clone(&repository), settings.delete_queue_capacity);
        Self {
            repository,
            deletions,
            base_url: settings.base_url,
        }
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Validates that the URL has a valid format (has a scheme and host).
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        }

        Ok(())
    }

    /// Shortens one URL on behalf of `user_id`.
    ///
    /// Re-submitting a stored URL is not an error: the existing key comes
    /// back with `conflict` set.
    pub async fn shorten(
        &self,
        original_url: impl Into<String>,
        user_id: Option<String>,
    ) -> Result<Shortened> {
        let original_url = original_url.into();
        Self::validate_url(&original_url)?;

        let record = ShortUrl::new(original_url, user_id);
        let conflicts = self.repository.save(std::slice::from_ref(&record)).await?;
        let conflict = conflicts.first().copied().unwrap_or_default();

        debug!(key = %record.key, conflict, "shortened url");
        Ok(Shortened {
            short_url: record.key.to_url(&self.base_url),
            key: record.key,
            conflict,
        })
    }

    /// Shortens a batch of URLs in one repository call.
    ///
    /// The whole batch is rejected if any URL is invalid. The response keeps
    /// request order and each item's correlation id.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        user_id: Option<String>,
    ) -> Result<Vec<BatchShortened>> {
        for item in &items {
            Self::validate_url(&item.original_url)?;
        }

        let records: Vec<ShortUrl> = items
            .iter()
            .map(|item| ShortUrl::new(item.original_url.clone(), user_id.clone()))
            .collect();
        let conflicts = self.repository.save(&records).await?;
        if conflicts.len() != records.len() {
            return Err(StorageError::Operation(format!(
                "expected {} conflict flags, got {}",
                records.len(),
                conflicts.len()
            ))
            .into());
        }

        debug!(batch = records.len(), "shortened url batch");
        Ok(items
            .into_iter()
            .zip(records)
            .zip(conflicts)
            .map(|((item, record), conflict)| BatchShortened {
                correlation_id: item.correlation_id,
                short_url: record.key.to_url(&self.base_url),
                key: record.key,
                conflict,
            })
            .collect())
    }

    /// Resolves a key to its record, or to a deleted / not-found outcome.
    pub async fn resolve(&self, key: &ShortKey) -> Result<Lookup> {
        Ok(self.repository.get(key).await?)
    }

    /// Lists the live URLs owned by `user_id`.
    pub async fn user_urls(&self, user_id: &str) -> Result<Vec<UserUrl>> {
        Ok(self.repository.list_by_user(user_id).await?)
    }

    /// Queues a soft delete and returns once it is queued.
    ///
    /// A lookup issued before the worker reaches the request still sees the
    /// live URL.
    pub async fn delete(&self, user_id: Option<String>, keys: Vec<ShortKey>) -> Result<()> {
        self.deletions.enqueue(user_id, keys).await
    }

    /// Like [`delete`](ShortenerService::delete), but fails with
    /// [`ShortenerError::QueueFull`] instead of waiting for room.
    pub fn try_delete(&self, user_id: Option<String>, keys: Vec<ShortKey>) -> Result<()> {
        self.deletions.try_enqueue(user_id, keys)
    }

    /// Counts live URLs and their owners.
    pub async fn stats(&self) -> Result<StorageStats> {
        Ok(self.repository.stats().await?)
    }

    /// Checks the backing store, giving up after `deadline`.
    pub async fn ping(&self, deadline: Duration) -> Result<()> {
        match tokio::time::timeout(deadline, self.repository.ping()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StorageError::Timeout(format!(
                "ping did not complete within {deadline:?}"
            ))
            .into()),
        }
    }

    /// Stops accepting deletes and waits for queued ones to be applied.
    pub async fn shutdown(&self) {
        info!("draining delete queue");
        self.deletions.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_storage::InMemoryRepository;

    fn test_service() -> ShortenerService<InMemoryRepository> {
        ShortenerService::new(
            Arc::new(InMemoryRepository::new()),
            ServiceSettings::builder().base_url("http://snip.test/").build(),
        )
    }

    fn user(id: &str) -> Option<String> {
        Some(id.to_string())
    }

    #[tokio::test]
    async fn shorten_then_resolve() {
        let service = test_service();

        let shortened = service.shorten("https://a.example", user("u1")).await.unwrap();
        assert!(!shortened.conflict);
        assert_eq!(shortened.key, ShortKey::derive("https://a.example"));
        assert_eq!(
            shortened.short_url,
            format!("http://snip.test/{}", shortened.key)
        );

        let lookup = service.resolve(&shortened.key).await.unwrap();
        assert_eq!(lookup.original_url(), Some("https://a.example"));
    }

    #[tokio::test]
    async fn shorten_same_url_twice_conflicts() {
        let service = test_service();

        let first = service.shorten("https://a.example", user("u1")).await.unwrap();
        let second = service.shorten("https://a.example", user("u1")).await.unwrap();

        assert_eq!(first.key, second.key);
        assert!(!first.conflict);
        assert!(second.conflict);
    }

    #[tokio::test]
    async fn shorten_with_invalid_url_fails() {
        let service = test_service();

        for url in ["", "not-a-valid-url", "ftp://files.example", "https://", "http:///path"] {
            let err = service.shorten(url, None).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn resolve_unknown_key() {
        let service = test_service();

        let lookup = service
            .resolve(&ShortKey::derive("https://never.example"))
            .await
            .unwrap();
        assert_eq!(lookup, Lookup::NotFound);
    }

    #[tokio::test]
    async fn batch_preserves_correlation_ids() {
        let service = test_service();
        let items: Vec<BatchItem> = (1..=3)
            .map(|i| BatchItem {
                correlation_id: i.to_string(),
                original_url: format!("https://{i}.example"),
            })
            .collect();

        let results = service.shorten_batch(items, user("u1")).await.unwrap();

        assert_eq!(results.len(), 3);
        for (i, result) in (1..=3).zip(&results) {
            assert_eq!(result.correlation_id, i.to_string());
            assert_eq!(result.key, ShortKey::derive(&format!("https://{i}.example")));
            assert!(!result.conflict);
        }
        assert_ne!(results[0].key, results[1].key);
        assert_ne!(results[1].key, results[2].key);
        assert_eq!(service.user_urls("u1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn batch_with_invalid_url_saves_nothing() {
        let service = test_service();
        let items = vec![
            BatchItem {
                correlation_id: "1".to_string(),
                original_url: "https://a.example".to_string(),
            },
            BatchItem {
                correlation_id: "2".to_string(),
                original_url: "nope".to_string(),
            },
        ];

        let err = service.shorten_batch(items, None).await.unwrap_err();
        assert!(matches!(err, ShortenerError::InvalidUrl(_)));
        assert_eq!(service.stats().await.unwrap().urls, 0);
    }

    #[tokio::test]
    async fn delete_lifecycle() {
        let service = test_service();

        let shortened = service.shorten("https://a.example", user("u1")).await.unwrap();
        let again = service.shorten("https://a.example", user("u1")).await.unwrap();
        assert_eq!(again.key, shortened.key);
        assert!(again.conflict);

        service
            .delete(user("u1"), vec![shortened.key.clone()])
            .await
            .unwrap();
        service.shutdown().await;

        assert_eq!(
            service.resolve(&shortened.key).await.unwrap(),
            Lookup::Deleted
        );
        assert!(service.user_urls("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_by_other_user_has_no_effect() {
        let service = test_service();
        let shortened = service.shorten("https://a.example", user("u1")).await.unwrap();

        service
            .delete(user("u2"), vec![shortened.key.clone()])
            .await
            .unwrap();
        service.shutdown().await;

        let lookup = service.resolve(&shortened.key).await.unwrap();
        assert_eq!(lookup.original_url(), Some("https://a.example"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_applied_eventually_while_running() {
        let service = test_service();
        let shortened = service.shorten("https://a.example", user("u1")).await.unwrap();

        service
            .delete(user("u1"), vec![shortened.key.clone()])
            .await
            .unwrap();

        awaitility::at_most(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .until_async(|| async {
                service.resolve(&shortened.key).await.unwrap() == Lookup::Deleted
            })
            .await;
    }

    #[tokio::test]
    async fn delete_after_shutdown_is_rejected() {
        let service = test_service();
        service.shutdown().await;

        let err = service
            .delete(user("u1"), vec![ShortKey::derive("https://a.example")])
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::QueueClosed));
    }

    #[tokio::test]
    async fn ping_surfaces_backend_unavailability() {
        let service = test_service();

        let err = service.ping(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(
            err,
            ShortenerError::Storage(StorageError::Unavailable(_))
        ));
    }
}
