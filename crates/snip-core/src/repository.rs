use crate::error::Result;
use crate::key::ShortKey;
use crate::url::{Lookup, ShortUrl, StorageStats, UserUrl};
use async_trait::async_trait;

/// A read-only view of a repository.
///
/// Readers may run concurrently with each other; implementations exclude
/// them while a write is in progress.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Looks up a key, telling a tombstoned record apart from one that
    /// never existed.
    async fn get(&self, key: &ShortKey) -> Result<Lookup>;

    /// Lists the live records owned by `user_id`. Order is unspecified.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UserUrl>>;

    /// Counts live records and their distinct owners.
    async fn stats(&self) -> Result<StorageStats>;

    /// Checks that a backing store is reachable.
    ///
    /// Backends without a live connection always report
    /// [`StorageError::Unavailable`](crate::StorageError::Unavailable).
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Persists a batch of records.
    ///
    /// Returns one conflict flag per input, in input order. A key that is
    /// already stored is left untouched and reported as `true`; the rest of
    /// the batch still goes through.
    async fn save(&self, batch: &[ShortUrl]) -> Result<Vec<bool>>;

    /// Soft-deletes `keys` on behalf of `user_id`.
    ///
    /// Keys owned by someone else, and keys that do not exist, are skipped
    /// silently. `None` is the administrative wildcard that matches any
    /// owner.
    async fn delete_urls(&self, user_id: Option<&str>, keys: &[ShortKey]) -> Result<()>;
}
