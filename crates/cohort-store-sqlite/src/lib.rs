//! SQLite backend for the Cohort data-capture engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every operation runs inside one SQLite
//! transaction on that thread through a [`Session`]; history rows are written
//! in the same transaction as the change they describe.

mod audit;
mod encode;
mod entities;
mod metadata;
mod schema;
mod session;
mod store;
mod values;

pub mod config;
pub mod error;

pub use audit::AuditLog;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use session::Session;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
