//! Sync job queue: durable enqueue, at-least-once delivery, bounded
//! retries with exponential backoff, and a dead-letter terminal state.
//!
//! Two interchangeable implementations: `SqlQueue` persists jobs in the
//! `sync_jobs` table; `MemoryQueue` keeps them in-process for tests and
//! embedded use.

use super::error::QueueError;
use super::types::{JobId, LeasedJob, NewJob, RetryOutcome, RetryPolicy, SyncTask};
use crate::infrastructure::database::entities::{sync_job, SyncJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Work queue decoupling notification receipt from processing.
///
/// Delivery is at-least-once; callers must make processing idempotent.
/// Jobs carry no global ordering guarantee.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    /// Durably add a job; safe to call from the webhook hot path.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError>;

    /// Lease the next runnable job, marking it in-flight. Returns `None`
    /// when nothing is runnable right now.
    async fn lease(&self) -> Result<Option<LeasedJob>, QueueError>;

    /// Mark a leased job as successfully completed.
    async fn ack(&self, id: JobId) -> Result<(), QueueError>;

    /// Re-queue a failed job under the backoff policy, or dead-letter it
    /// once the attempt budget is exhausted.
    async fn retry(&self, id: JobId, error: &str) -> Result<RetryOutcome, QueueError>;

    /// Dead-letter a job immediately (non-retryable failure).
    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError>;

    /// Number of jobs waiting to run.
    async fn depth(&self) -> Result<u64, QueueError>;

    /// Number of dead-lettered jobs.
    async fn dead_letter_count(&self) -> Result<u64, QueueError>;

    /// Re-queue jobs whose lease outlived `lease_timeout`, e.g. after a
    /// worker crash. Called at startup and periodically by the workers.
    async fn reclaim_stale(&self, lease_timeout: Duration) -> Result<u64, QueueError>;
}

fn run_at_after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1))
}

// ---------------------------------------------------------------------------
// SQL-backed queue
// ---------------------------------------------------------------------------

/// Durable queue over the `sync_jobs` table.
pub struct SqlQueue {
    conn: DatabaseConnection,
    policy: RetryPolicy,
    /// Serializes the find-then-mark step of leasing within this process
    lease_guard: Mutex<()>,
}

impl SqlQueue {
    pub fn new(conn: DatabaseConnection, policy: RetryPolicy) -> Self {
        Self {
            conn,
            policy,
            lease_guard: Mutex::new(()),
        }
    }

    async fn find_by_id(&self, id: JobId) -> Result<sync_job::Model, QueueError> {
        SyncJob::find()
            .filter(sync_job::Column::Uuid.eq(Uuid::from(id)))
            .one(&self.conn)
            .await?
            .ok_or(QueueError::NotFound(id))
    }
}

#[async_trait]
impl SyncQueue for SqlQueue {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let id = JobId::new();
        let now = Utc::now();

        let model = sync_job::ActiveModel {
            uuid: Set(id.into()),
            tenant_id: Set(job.tenant_id),
            key: Set(job.key),
            task: Set(serde_json::to_value(&job.task)?),
            status: Set(sync_job::JobState::Queued),
            attempts: Set(0),
            run_at: Set(now),
            leased_at: Set(None),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
            ..Default::default()
        };
        model.insert(&self.conn).await?;

        debug!(job = %id, "Enqueued sync job");
        Ok(id)
    }

    async fn lease(&self) -> Result<Option<LeasedJob>, QueueError> {
        let _guard = self.lease_guard.lock().await;

        let Some(model) = SyncJob::find()
            .filter(sync_job::Column::Status.eq(sync_job::JobState::Queued))
            .filter(sync_job::Column::RunAt.lte(Utc::now()))
            .order_by_asc(sync_job::Column::RunAt)
            .order_by_asc(sync_job::Column::Id)
            .one(&self.conn)
            .await?
        else {
            return Ok(None);
        };

        let task: SyncTask = serde_json::from_value(model.task.clone())?;
        let leased = LeasedJob {
            id: model.uuid.into(),
            tenant_id: model.tenant_id,
            key: model.key.clone(),
            task,
            attempts: (model.attempts + 1) as u32,
            enqueued_at: model.created_at,
        };

        let mut active: sync_job::ActiveModel = model.into();
        active.status = Set(sync_job::JobState::Leased);
        active.attempts = Set(leased.attempts as i32);
        active.leased_at = Set(Some(Utc::now()));
        active.updated_at = Set(Utc::now());
        active.update(&self.conn).await?;

        Ok(Some(leased))
    }

    async fn ack(&self, id: JobId) -> Result<(), QueueError> {
        let model = self.find_by_id(id).await?;
        let mut active: sync_job::ActiveModel = model.into();
        active.status = Set(sync_job::JobState::Completed);
        active.completed_at = Set(Some(Utc::now()));
        active.updated_at = Set(Utc::now());
        active.update(&self.conn).await?;
        Ok(())
    }

    async fn retry(&self, id: JobId, error: &str) -> Result<RetryOutcome, QueueError> {
        let model = self.find_by_id(id).await?;
        let attempts = model.attempts as u32;

        let mut active: sync_job::ActiveModel = model.into();
        active.last_error = Set(Some(error.to_string()));
        active.updated_at = Set(Utc::now());

        if attempts >= self.policy.max_attempts {
            warn!(job = %id, attempts, "Retry budget exhausted, dead-lettering");
            active.status = Set(sync_job::JobState::Dead);
            active.update(&self.conn).await?;
            return Ok(RetryOutcome::DeadLettered);
        }

        let run_at = run_at_after(self.policy.delay_for_attempt(attempts));
        active.status = Set(sync_job::JobState::Queued);
        active.leased_at = Set(None);
        active.run_at = Set(run_at);
        active.update(&self.conn).await?;

        debug!(job = %id, attempts, %run_at, "Scheduled retry");
        Ok(RetryOutcome::Scheduled { run_at })
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        let model = self.find_by_id(id).await?;
        let mut active: sync_job::ActiveModel = model.into();
        active.status = Set(sync_job::JobState::Dead);
        active.last_error = Set(Some(error.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&self.conn).await?;
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(SyncJob::find()
            .filter(sync_job::Column::Status.eq(sync_job::JobState::Queued))
            .count(&self.conn)
            .await?)
    }

    async fn dead_letter_count(&self) -> Result<u64, QueueError> {
        Ok(SyncJob::find()
            .filter(sync_job::Column::Status.eq(sync_job::JobState::Dead))
            .count(&self.conn)
            .await?)
    }

    async fn reclaim_stale(&self, lease_timeout: Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(lease_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(10));

        let stale = SyncJob::find()
            .filter(sync_job::Column::Status.eq(sync_job::JobState::Leased))
            .filter(sync_job::Column::LeasedAt.lt(cutoff))
            .all(&self.conn)
            .await?;

        let count = stale.len() as u64;
        for model in stale {
            warn!(job = %model.uuid, "Reclaiming stale lease");
            let mut active: sync_job::ActiveModel = model.into();
            active.status = Set(sync_job::JobState::Queued);
            active.leased_at = Set(None);
            active.run_at = Set(Utc::now());
            active.updated_at = Set(Utc::now());
            active.update(&self.conn).await?;
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// In-memory queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemState {
    Queued,
    Leased,
    Dead,
}

#[derive(Debug, Clone)]
struct MemJob {
    id: JobId,
    tenant_id: Uuid,
    key: String,
    task: SyncTask,
    attempts: u32,
    state: MemState,
    run_at: DateTime<Utc>,
    leased_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    enqueued_at: DateTime<Utc>,
}

/// In-process queue with the same contract as `SqlQueue`.
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<MemJob>>,
    policy: RetryPolicy,
}

impl MemoryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            policy,
        }
    }

    /// Errors recorded on dead-lettered jobs, oldest first (test hook).
    pub async fn dead_letter_errors(&self) -> Vec<String> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.state == MemState::Dead)
            .filter_map(|j| j.last_error.clone())
            .collect()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl SyncQueue for MemoryQueue {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let id = JobId::new();
        let now = Utc::now();
        self.jobs.lock().await.push_back(MemJob {
            id,
            tenant_id: job.tenant_id,
            key: job.key,
            task: job.task,
            attempts: 0,
            state: MemState::Queued,
            run_at: now,
            leased_at: None,
            last_error: None,
            enqueued_at: now,
        });
        Ok(id)
    }

    async fn lease(&self) -> Result<Option<LeasedJob>, QueueError> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();
        let Some(job) = jobs
            .iter_mut()
            .filter(|j| j.state == MemState::Queued && j.run_at <= now)
            .min_by_key(|j| j.run_at)
        else {
            return Ok(None);
        };

        job.state = MemState::Leased;
        job.attempts += 1;
        job.leased_at = Some(now);
        Ok(Some(LeasedJob {
            id: job.id,
            tenant_id: job.tenant_id,
            key: job.key.clone(),
            task: job.task.clone(),
            attempts: job.attempts,
            enqueued_at: job.enqueued_at,
        }))
    }

    async fn ack(&self, id: JobId) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter().position(|j| j.id == id) {
            Some(idx) => {
                jobs.remove(idx);
                Ok(())
            }
            None => Err(QueueError::NotFound(id)),
        }
    }

    async fn retry(&self, id: JobId, error: &str) -> Result<RetryOutcome, QueueError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;

        job.last_error = Some(error.to_string());
        if job.attempts >= self.policy.max_attempts {
            job.state = MemState::Dead;
            return Ok(RetryOutcome::DeadLettered);
        }

        let run_at = run_at_after(self.policy.delay_for_attempt(job.attempts));
        job.state = MemState::Queued;
        job.leased_at = None;
        job.run_at = run_at;
        Ok(RetryOutcome::Scheduled { run_at })
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;
        job.state = MemState::Dead;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.state == MemState::Queued)
            .count() as u64)
    }

    async fn dead_letter_count(&self) -> Result<u64, QueueError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.state == MemState::Dead)
            .count() as u64)
    }

    async fn reclaim_stale(&self, lease_timeout: Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(lease_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(10));

        let mut jobs = self.jobs.lock().await;
        let mut count = 0;
        for job in jobs.iter_mut() {
            if job.state == MemState::Leased && job.leased_at.is_some_and(|t| t < cutoff) {
                job.state = MemState::Queued;
                job.leased_at = None;
                job.run_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }
}
