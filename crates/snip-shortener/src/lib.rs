//! URL shortener service implementation.
//!
//! This crate provides [`ShortenerService`], the surface a transport layer
//! drives, and the [`DeleteQueue`] that applies soft deletes in the
//! background. Core types are re-exported from `snip_core`.

pub mod deletion;
pub mod error;
pub mod service;

pub use deletion::{DeleteQueue, DeleteRequest};
pub use error::ShortenerError;
pub use service::{BatchItem, BatchShortened, ServiceSettings, Shortened, ShortenerService};
pub use snip_core::{Lookup, ShortKey, UserUrl};
