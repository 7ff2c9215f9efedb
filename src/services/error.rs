//! Sync engine error taxonomy.
//!
//! The retry decision lives here: transient platform and storage
//! failures go back to the queue under backoff, everything else is
//! terminal for the job.

use crate::infrastructure::jobs::QueueError;
use crate::platform::PlatformError;
use crate::vault::VaultError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Sync processing errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Bad or missing webhook signature; never retried, always 401
    #[error("Webhook authentication failed: {0}")]
    Authentication(String),

    /// Item not yet tracked; treated as a skip, not an error
    #[error("No mapping for external item {0}")]
    MappingNotFound(String),

    /// Malformed payload or invalid quantity; rejected without retry
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential decryption failed: vault misconfiguration or tampering.
    /// Fatal for this tenant's processing and surfaced loudly.
    #[error("Credential error for tenant {tenant}: {source}")]
    Credential {
        tenant: Uuid,
        #[source]
        source: VaultError,
    },

    /// Required sync configuration is absent (e.g. no location chosen).
    /// A hard stop, never a default-to-zero.
    #[error("Sync not configured: {0}")]
    ConfigMissing(String),

    /// External platform failure; retryability decided per error
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Job exceeded its total processing budget; returned to the queue
    #[error("Job timed out after {0:?}")]
    JobTimeout(Duration),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Queue error
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl SyncError {
    /// Whether the queue should re-deliver the job under backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Platform(e) => !matches!(e, PlatformError::InvalidResponse(_)),
            Self::JobTimeout(_) | Self::Database(_) | Self::Queue(_) => true,
            Self::Authentication(_)
            | Self::MappingNotFound(_)
            | Self::Validation(_)
            | Self::Credential { .. }
            | Self::ConfigMissing(_) => false,
        }
    }
}

/// Result type for sync processing
pub type Result<T> = std::result::Result<T, SyncError>;
