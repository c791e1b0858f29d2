//! Storage backends for the snip URL shortener.
//!
//! Three implementations of the [`Repository`] contract with different
//! durability: [`InMemoryRepository`] (volatile), [`FileRepository`]
//! (append-only JSON lines log) and [`PostgresRepository`] (transactional).
//! [`StorageConfig`] selects one of them at startup.

pub mod config;
pub mod file;
mod index;
pub mod memory;
pub mod postgres;

pub use config::StorageConfig;
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use snip_core::{Lookup, ReadRepository, Repository, StorageError};
