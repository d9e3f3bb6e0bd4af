//! Persistence layer for lessord
//!
//! Provides:
//! - Inventory table (one row per leasable unit, grouped by login)
//! - Atomic lease transitions (claim, assign, extend, release, rotate)
//! - Rotation quarantine and feedback credits
//! - Authorized operators
//! - Audit log (append-only)

mod account;
mod audit;
mod sqlite;
mod traits;

pub use account::*;
pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A row violates the owner/lease_start pairing
    #[error("Inconsistent row: {0}")]
    Inconsistent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
