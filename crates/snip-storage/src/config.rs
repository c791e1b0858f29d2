use crate::{FileRepository, InMemoryRepository, PostgresRepository};
use snip_core::error::Result;
use snip_core::Repository;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// The single storage backend a process runs against.
///
/// Resolved once at startup; there is no switching at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    File(PathBuf),
    Postgres(String),
}

impl StorageConfig {
    /// Picks a backend from the configured locations.
    ///
    /// A database DSN wins over a file path; with neither, storage is
    /// in-memory. Empty values count as unset.
    pub fn resolve(database_dsn: Option<String>, file_storage_path: Option<PathBuf>) -> Self {
        if let Some(dsn) = database_dsn.filter(|dsn| !dsn.is_empty()) {
            return Self::Postgres(dsn);
        }
        if let Some(path) = file_storage_path.filter(|path| !path.as_os_str().is_empty()) {
            return Self::File(path);
        }
        Self::InMemory
    }

    /// Opens the configured backend.
    ///
    /// Failing to open the log file, to connect or to migrate is returned as
    /// an error; callers treat it as fatal.
    pub async fn open(&self) -> Result<Arc<dyn Repository>> {
        info!(storage_backend = %self, "opening storage");

        let repository: Arc<dyn Repository> = match self {
            StorageConfig::InMemory => Arc::new(InMemoryRepository::new()),
            StorageConfig::File(path) => Arc::new(FileRepository::open(path).await?),
            StorageConfig::Postgres(dsn) => Arc::new(PostgresRepository::connect(dsn).await?),
        };
        Ok(repository)
    }
}

impl Display for StorageConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageConfig::InMemory => write!(f, "in-memory"),
            StorageConfig::File(path) => write!(f, "file:{}", path.display()),
            // the DSN may carry credentials
            StorageConfig::Postgres(_) => write!(f, "postgres"),
        }
    }
}
