use crate::index::UserIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::error::Result;
use snip_core::{
    Lookup, ReadRepository, Repository, ShortKey, ShortUrl, StorageError, StorageStats, UserUrl,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// In-memory storage entry for a URL mapping.
#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    user_id: Option<String>,
    is_deleted: bool,
}

impl Entry {
    fn to_record(&self, key: &ShortKey) -> ShortUrl {
        ShortUrl {
            key: key.clone(),
            original_url: self.original_url.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<ShortKey, Entry>,
    users: UserIndex,
}

/// Volatile implementation of the [`Repository`] trait.
///
/// The key map and the per-user index live behind one lock so a writer
/// always updates both together. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory repository with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(State {
                records: HashMap::with_capacity(capacity),
                users: UserIndex::default(),
            }),
        }
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, key: &ShortKey) -> Result<Lookup> {
        let state = self.state.read();

        let lookup = match state.records.get(key) {
            None => Lookup::NotFound,
            Some(entry) if entry.is_deleted => Lookup::Deleted,
            Some(entry) => Lookup::Found(entry.to_record(key)),
        };
        Ok(lookup)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UserUrl>> {
        Ok(self.state.read().users.list(user_id))
    }

    async fn stats(&self) -> Result<StorageStats> {
        let state = self.state.read();
        let urls = state.records.values().filter(|e| !e.is_deleted).count();

        Ok(StorageStats {
            urls: urls as u64,
            users: state.users.owners() as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Err(StorageError::Unavailable(
            "in-memory storage has no backing store".to_string(),
        ))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save(&self, batch: &[ShortUrl]) -> Result<Vec<bool>> {
        let mut state = self.state.write();
        let mut conflicts = Vec::with_capacity(batch.len());

        for url in batch {
            if state.records.contains_key(&url.key) {
                trace!(key = %url.key, "key already stored");
                conflicts.push(true);
                continue;
            }

            state.records.insert(
                url.key.clone(),
                Entry {
                    original_url: url.original_url.clone(),
                    user_id: url.user_id.clone(),
                    is_deleted: false,
                },
            );
            if let Some(user) = url.owner() {
                state.users.insert(user, &url.key, &url.original_url);
            }
            conflicts.push(false);
        }

        Ok(conflicts)
    }

    async fn delete_urls(&self, user_id: Option<&str>, keys: &[ShortKey]) -> Result<()> {
        let mut state = self.state.write();
        let State { records, users } = &mut *state;

        for key in keys {
            let Some(entry) = records.get_mut(key) else {
                continue;
            };
            if entry.is_deleted || !owned_by(entry.user_id.as_deref(), user_id) {
                continue;
            }

            entry.is_deleted = true;
            if let Some(owner) = entry.user_id.as_deref() {
                users.remove(owner, key);
            }
            debug!(key = %key, "marked url as deleted");
        }

        Ok(())
    }
}

/// Whether a record owned by `owner` may be deleted on behalf of `requester`.
pub(crate) fn owned_by(owner: Option<&str>, requester: Option<&str>) -> bool {
    match requester {
        None => true,
        Some(requester) => owner == Some(requester),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn url(original: &str, user: Option<&str>) -> ShortUrl {
        ShortUrl::new(original, user.map(str::to_string))
    }

    #[tokio::test]
    async fn save_and_get() {
        let repo = InMemoryRepository::new();
        let record = url("https://example.com", Some("u1"));

        let conflicts = repo.save(std::slice::from_ref(&record)).await.unwrap();
        assert_eq!(conflicts, vec![false]);

        let result = repo.get(&record.key).await.unwrap();
        assert_eq!(result, Lookup::Found(record));
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let repo = InMemoryRepository::new();

        let result = repo.get(&ShortKey::derive("https://nope")).await.unwrap();
        assert_eq!(result, Lookup::NotFound);
    }

    #[tokio::test]
    async fn save_conflict_keeps_first_record() {
        let repo = InMemoryRepository::new();
        let first = url("https://example.com", Some("u1"));
        let second = url("https://example.com", Some("u2"));

        repo.save(&[first.clone()]).await.unwrap();
        let conflicts = repo.save(&[second]).await.unwrap();
        assert_eq!(conflicts, vec![true]);

        let result = repo.get(&first.key).await.unwrap();
        assert_eq!(result, Lookup::Found(first));
        assert!(repo.list_by_user("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_reports_conflicts_per_item() {
        let repo = InMemoryRepository::new();
        repo.save(&[url("https://b.example", None)]).await.unwrap();

        let conflicts = repo
            .save(&[
                url("https://a.example", None),
                url("https://b.example", None),
                url("https://c.example", None),
            ])
            .await
            .unwrap();

        assert_eq!(conflicts, vec![false, true, false]);
    }

    #[tokio::test]
    async fn anonymous_records_stay_out_of_user_index() {
        let repo = InMemoryRepository::new();
        repo.save(&[url("https://example.com", None)]).await.unwrap();

        assert!(repo.list_by_user("").await.unwrap().is_empty());
        assert_eq!(repo.stats().await.unwrap().users, 0);
    }

    #[tokio::test]
    async fn delete_tombstones_and_unindexes() {
        let repo = InMemoryRepository::new();
        let a = url("https://a.example", Some("u1"));
        let b = url("https://b.example", Some("u1"));
        repo.save(&[a.clone(), b.clone()]).await.unwrap();

        repo.delete_urls(Some("u1"), &[a.key.clone()]).await.unwrap();

        assert_eq!(repo.get(&a.key).await.unwrap(), Lookup::Deleted);
        let listed = repo.list_by_user("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, b.key);
    }

    #[tokio::test]
    async fn delete_skips_other_users_keys() {
        let repo = InMemoryRepository::new();
        let record = url("https://example.com", Some("u1"));
        repo.save(&[record.clone()]).await.unwrap();

        repo.delete_urls(Some("u2"), &[record.key.clone()])
            .await
            .unwrap();

        assert_eq!(repo.get(&record.key).await.unwrap(), Lookup::Found(record));
        assert_eq!(repo.list_by_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admin_delete_matches_any_owner() {
        let repo = InMemoryRepository::new();
        let owned = url("https://a.example", Some("u1"));
        let other = url("https://b.example", Some("u2"));
        repo.save(&[owned.clone(), other.clone()]).await.unwrap();

        repo.delete_urls(None, &[owned.key.clone()]).await.unwrap();

        assert_eq!(repo.get(&owned.key).await.unwrap(), Lookup::Deleted);
        assert!(repo.list_by_user("u1").await.unwrap().is_empty());
        assert_eq!(repo.list_by_user("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_ignores_unknown_keys() {
        let repo = InMemoryRepository::new();
        repo.delete_urls(Some("u1"), &[ShortKey::derive("https://nope")])
            .await
            .unwrap();
        assert_eq!(repo.stats().await.unwrap(), StorageStats::default());
    }

    #[tokio::test]
    async fn resave_after_delete_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let record = url("https://example.com", Some("u1"));
        repo.save(&[record.clone()]).await.unwrap();
        repo.delete_urls(Some("u1"), &[record.key.clone()])
            .await
            .unwrap();

        let conflicts = repo.save(&[record.clone()]).await.unwrap();
        assert_eq!(conflicts, vec![true]);
        assert_eq!(repo.get(&record.key).await.unwrap(), Lookup::Deleted);
    }

    #[tokio::test]
    async fn stats_counts_live_records_and_owners() {
        let repo = InMemoryRepository::new();
        let a = url("https://a.example", Some("u1"));
        repo.save(&[
            a.clone(),
            url("https://b.example", Some("u2")),
            url("https://c.example", None),
        ])
        .await
        .unwrap();
        repo.delete_urls(Some("u1"), &[a.key]).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats, StorageStats { urls: 2, users: 1 });
    }

    #[tokio::test]
    async fn ping_reports_unavailable() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.ping().await,
            Err(StorageError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_access() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let record = url(&format!("https://example{}.com", i), Some("u1"));
                repo.save(&[record]).await.unwrap();
            }));
        }

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let key = ShortKey::derive(&format!("https://example{}.com", i));
                let _ = repo.get(&key).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let original = format!("https://example{}.com", i);
            let result = repo.get(&ShortKey::derive(&original)).await.unwrap();
            assert_eq!(result.original_url(), Some(original.as_str()));
        }
        assert_eq!(repo.list_by_user("u1").await.unwrap().len(), 10);
    }
}
