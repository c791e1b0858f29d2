//! Disposable containers for integration tests. Requires a running Docker
//! daemon.

pub mod error;
pub mod postgres;

pub use error::{Result, TestInfraError};
