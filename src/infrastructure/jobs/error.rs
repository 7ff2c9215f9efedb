//! Queue-specific error types

use super::types::JobId;
use thiserror::Error;

/// Sync queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Task payload could not be (de)serialized
    #[error("Task serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job not found or not in the expected state
    #[error("Job not found: {0}")]
    NotFound(JobId),
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
