//! Sync job queue infrastructure

pub mod error;
pub mod queue;
pub mod types;

pub use error::QueueError;
pub use queue::{MemoryQueue, SqlQueue, SyncQueue};
pub use types::{JobId, LeasedJob, NewJob, RetryOutcome, RetryPolicy, SyncTask};
