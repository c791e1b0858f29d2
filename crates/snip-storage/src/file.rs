use crate::index::UserIndex;
use crate::memory::owned_by;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snip_core::error::Result;
use snip_core::{
    normalize_user, Lookup, ReadRepository, Repository, ShortKey, ShortUrl, StorageError,
    StorageStats, UserUrl,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

/// One line of the storage log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    uuid: u64,
    short_key: ShortKey,
    original_url: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    is_deleted: bool,
}

impl FileRecord {
    fn owner(&self) -> Option<&str> {
        Some(self.user_id.as_str()).filter(|user| !user.is_empty())
    }

    fn to_record(&self) -> ShortUrl {
        ShortUrl {
            key: self.short_key.clone(),
            original_url: self.original_url.clone(),
            user_id: normalize_user(Some(self.user_id.clone())),
        }
    }

    fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| StorageError::InvalidData(format!("cannot encode record: {e}")))?;
        line.push('\n');
        Ok(line)
    }
}

struct State {
    file: File,
    records: HashMap<ShortKey, FileRecord>,
    users: UserIndex,
    next_uuid: u64,
}

/// Append-only newline-delimited JSON log with an in-memory index.
///
/// Every accepted save appends one line. The whole file is replayed on
/// [`open`](FileRepository::open), which is the only recovery path. A
/// delete cannot patch a line in place, so it rewrites the log from the
/// in-memory state, tombstones included.
///
/// Appends and rewrites hold the same write lock, so a rewrite never races
/// an in-flight append.
pub struct FileRepository {
    path: PathBuf,
    state: RwLock<State>,
}

impl std::fmt::Debug for FileRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileRepository {
    /// Opens (or creates) the log at `path` and replays it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = open_append(&path).await?;

        let contents = fs::read_to_string(&path).await?;
        let records = replay(&contents)?;
        let next_uuid = records.values().map(|r| r.uuid).max().unwrap_or(0) + 1;
        let users = build_index(&records);

        info!(
            path = %path.display(),
            records = records.len(),
            "replayed file storage"
        );

        Ok(Self {
            path,
            state: RwLock::new(State {
                file,
                records,
                users,
                next_uuid,
            }),
        })
    }

    /// Returns the path of the storage log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the log with one line per in-memory record.
    ///
    /// The new contents are written to a sibling file and renamed over the
    /// log, then the append handle is reopened.
    async fn rewrite(&self, state: &mut State) -> Result<()> {
        let mut ordered: Vec<&FileRecord> = state.records.values().collect();
        ordered.sort_by_key(|r| r.uuid);

        let mut contents = String::new();
        for record in ordered {
            contents.push_str(&record.to_line()?);
        }

        state.file.flush().await?;

        let staging = self.path.with_extension("rewrite");
        let mut out = File::create(&staging).await?;
        out.write_all(contents.as_bytes()).await?;
        out.sync_all().await?;
        drop(out);

        fs::rename(&staging, &self.path).await?;
        state.file = open_append(&self.path).await?;

        debug!(
            path = %self.path.display(),
            records = state.records.len(),
            "rewrote file storage"
        );
        Ok(())
    }
}

async fn open_append(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(file)
}

/// Parses the log. Blank lines are skipped; a later line for a key
/// replaces an earlier one.
fn replay(contents: &str) -> Result<HashMap<ShortKey, FileRecord>> {
    let mut records = HashMap::new();

    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: FileRecord = serde_json::from_str(line).map_err(|e| {
            StorageError::InvalidData(format!("line {}: {e}", idx + 1))
        })?;
        records.insert(record.short_key.clone(), record);
    }

    Ok(records)
}

fn build_index(records: &HashMap<ShortKey, FileRecord>) -> UserIndex {
    let mut ordered: Vec<&FileRecord> = records.values().filter(|r| !r.is_deleted).collect();
    ordered.sort_by_key(|r| r.uuid);

    let mut users = UserIndex::default();
    for record in ordered {
        if let Some(owner) = record.owner() {
            users.insert(owner, &record.short_key, &record.original_url);
        }
    }
    users
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn get(&self, key: &ShortKey) -> Result<Lookup> {
        let state = self.state.read().await;

        let lookup = match state.records.get(key) {
            None => Lookup::NotFound,
            Some(record) if record.is_deleted => Lookup::Deleted,
            Some(record) => Lookup::Found(record.to_record()),
        };
        Ok(lookup)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UserUrl>> {
        Ok(self.state.read().await.users.list(user_id))
    }

    async fn stats(&self) -> Result<StorageStats> {
        let state = self.state.read().await;
        let urls = state.records.values().filter(|r| !r.is_deleted).count();

        Ok(StorageStats {
            urls: urls as u64,
            users: state.users.owners() as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Err(StorageError::Unavailable(
            "file storage has no database connection".to_string(),
        ))
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save(&self, batch: &[ShortUrl]) -> Result<Vec<bool>> {
        let mut state = self.state.write().await;
        let mut conflicts = Vec::with_capacity(batch.len());

        for url in batch {
            if state.records.contains_key(&url.key) {
                trace!(key = %url.key, "key already stored");
                conflicts.push(true);
                continue;
            }

            let record = FileRecord {
                uuid: state.next_uuid,
                short_key: url.key.clone(),
                original_url: url.original_url.clone(),
                user_id: url.user_id.clone().unwrap_or_default(),
                is_deleted: false,
            };
            state.file.write_all(record.to_line()?.as_bytes()).await?;
            state.next_uuid += 1;

            if let Some(owner) = record.owner() {
                state.users.insert(owner, &record.short_key, &record.original_url);
            }
            state.records.insert(record.short_key.clone(), record);
            conflicts.push(false);
        }

        state.file.flush().await?;
        Ok(conflicts)
    }

    async fn delete_urls(&self, user_id: Option<&str>, keys: &[ShortKey]) -> Result<()> {
        let mut state = self.state.write().await;
        let mut changed = false;

        {
            let State { records, users, .. } = &mut *state;
            for key in keys {
                let Some(record) = records.get_mut(key) else {
                    continue;
                };
                if record.is_deleted || !owned_by(record.owner(), user_id) {
                    continue;
                }

                record.is_deleted = true;
                if let Some(owner) = record.owner() {
                    users.remove(owner, key);
                }
                changed = true;
                debug!(key = %key, "marked url as deleted");
            }
        }

        if changed {
            self.rewrite(&mut state).await?;
        }
        Ok(())
    }
}
