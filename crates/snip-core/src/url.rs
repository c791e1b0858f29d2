use crate::key::ShortKey;
use serde::{Deserialize, Serialize};

/// A URL record as handed to and returned from a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrl {
    /// Content-derived key of `original_url`.
    pub key: ShortKey,
    /// The original URL that was shortened.
    pub original_url: String,
    /// Owning session, `None` for anonymous records.
    pub user_id: Option<String>,
}

impl ShortUrl {
    /// Builds a record for `original_url`, deriving its key.
    pub fn new(original_url: impl Into<String>, user_id: Option<String>) -> Self {
        let original_url = original_url.into();
        Self {
            key: ShortKey::derive(&original_url),
            original_url,
            user_id: normalize_user(user_id),
        }
    }

    /// Returns the owner, if any.
    pub fn owner(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// One entry of a user's URL listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    #[serde(rename = "short_url")]
    pub key: ShortKey,
    pub original_url: String,
}

/// Outcome of a key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The key maps to a live record.
    Found(ShortUrl),
    /// The key existed and has been soft-deleted.
    Deleted,
    /// The key was never stored.
    NotFound,
}

impl Lookup {
    /// Returns the original URL of a live record.
    pub fn original_url(&self) -> Option<&str> {
        match self {
            Lookup::Found(url) => Some(&url.original_url),
            Lookup::Deleted | Lookup::NotFound => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Lookup::Deleted)
    }
}

/// Record and owner counts reported by [`ReadRepository::stats`](crate::ReadRepository::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Live (non-deleted) records.
    pub urls: u64,
    /// Distinct owners with at least one live record.
    pub users: u64,
}

/// Maps the empty user id used on the wire to `None`.
pub fn normalize_user(user_id: Option<String>) -> Option<String> {
    user_id.filter(|user| !user.is_empty())
}
