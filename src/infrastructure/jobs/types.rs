//! Core types for the sync job queue

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<JobId> for Uuid {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// A unit of sync work carried by the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncTask {
    /// A validated platform webhook awaiting processing. The payload is
    /// the raw notification body; the worker never trusts any quantity
    /// embedded in it.
    InboundWebhook {
        topic: String,
        payload: serde_json::Value,
    },

    /// Propagate an internally-originated quantity to the platform as an
    /// absolute set (idempotent under retry).
    PushInventory { sku: String, quantity: i64 },
}

impl SyncTask {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InboundWebhook { .. } => "inbound_webhook",
            Self::PushInventory { .. } => "push_inventory",
        }
    }
}

/// A job to be enqueued
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: Uuid,
    /// Serialization/routing key, e.g. "tenant:item" or "tenant:sku"
    pub key: String,
    pub task: SyncTask,
}

/// A job leased for processing
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub id: JobId,
    pub tenant_id: Uuid,
    pub key: String,
    pub task: SyncTask,
    /// Delivery attempts including this one
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of asking the queue to retry a failed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-queued with a backoff delay
    Scheduled { run_at: DateTime<Utc> },
    /// Retry budget exhausted; job set aside for manual inspection
    DeadLettered,
}

/// Exponential backoff policy for job re-delivery
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Total delivery attempts before dead-lettering
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_interval: Duration::from_secs(600),
            max_attempts: 8,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-delivering a job that has failed `attempt` times.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let mut delay = self.initial_interval;
        for _ in 0..attempt {
            match backoff.next_backoff() {
                Some(d) => delay = d,
                None => break,
            }
        }
        delay
    }
}
