//! Persistence layer for warden
//!
//! Provides:
//! - Subject ledger (who the system has ever seen)
//! - Sanction records with an atomic one-open-sanction-per-subject slot
//! - Durable reversal jobs that survive restarts

mod sqlite;
mod traits;

pub use sqlite::*;
pub use traits::*;

use thiserror::Error;
use warden_util::SubjectId;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Subject {0} already has an active sanction")]
    DuplicateActiveSanction(SubjectId),

    #[error("Subject {0} has no active sanction")]
    NoActiveSanction(SubjectId),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
