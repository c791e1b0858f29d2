//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the content-addressed key deriver, the URL record
//! types and the repository contract shared by every storage backend.

pub mod error;
pub mod key;
pub mod repository;
pub mod url;

pub use error::{CoreError, StorageError};
pub use key::ShortKey;
pub use repository::{ReadRepository, Repository};
pub use url::{normalize_user, Lookup, ShortUrl, StorageStats, UserUrl};
