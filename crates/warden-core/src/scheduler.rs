//! Durable reversal scheduler
//!
//! Jobs live in the [`JobStore`], so nothing is lost across restarts. The
//! scheduler is driven by [`ReversalScheduler::tick`]: each tick leases the
//! jobs that are due, hands them to a [`ReversalHandler`], and then deletes,
//! reschedules (exponential backoff) or parks them as exhausted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use warden_api::{JobState, ReversalJob};
use warden_config::SchedulerConfig;
use warden_store::JobStore;
use warden_util::{SanctionId, SubjectId};

use crate::{SanctionError, SanctionResult};

/// Callback invoked when a reversal job fires
#[async_trait]
pub trait ReversalHandler: Send + Sync {
    /// Perform the reversal. An error schedules a retry.
    async fn on_reversal_due(&self, job: &ReversalJob, now: DateTime<Utc>) -> SanctionResult<()>;
}

/// What happened to one fired job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Handler succeeded; job deleted
    Completed {
        sanction_id: SanctionId,
        subject: SubjectId,
    },

    /// Handler failed; job pushed back
    Retrying {
        sanction_id: SanctionId,
        subject: SubjectId,
        attempt: u32,
        next_fire_at: DateTime<Utc>,
        error: String,
    },

    /// Handler failed for the last allowed time; job parked
    Exhausted {
        sanction_id: SanctionId,
        subject: SubjectId,
        attempts: u32,
        error: String,
    },
}

/// Summary of the startup recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Leases dropped from a previous process
    pub released_leases: usize,
    /// Pending jobs whose fire time has already passed
    pub overdue: usize,
    /// Pending jobs still in the future
    pub upcoming: usize,
    /// Jobs parked after exhausting their retries
    pub exhausted: usize,
}

pub struct ReversalScheduler {
    jobs: Arc<dyn JobStore>,
    config: SchedulerConfig,
}

impl ReversalScheduler {
    pub fn new(jobs: Arc<dyn JobStore>, config: SchedulerConfig) -> Self {
        Self { jobs, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a one-shot reversal at `fire_at`
    pub fn schedule(
        &self,
        sanction_id: SanctionId,
        subject: &SubjectId,
        fire_at: DateTime<Utc>,
    ) -> SanctionResult<()> {
        self.jobs.upsert_job(sanction_id, subject, fire_at)?;
        info!(
            sanction_id = %sanction_id,
            subject = %subject,
            fire_at = %fire_at,
            "Reversal scheduled"
        );
        Ok(())
    }

    /// Remove a job that has not fired. Returns false if there was none.
    pub fn cancel(&self, sanction_id: SanctionId) -> SanctionResult<bool> {
        let removed = self.jobs.delete_job(sanction_id)?;
        if removed {
            info!(sanction_id = %sanction_id, "Reversal cancelled");
        }
        Ok(removed)
    }

    /// Whether a job (pending or exhausted) exists for the sanction
    pub fn is_scheduled(&self, sanction_id: SanctionId) -> SanctionResult<bool> {
        Ok(self.jobs.get_job(sanction_id)?.is_some())
    }

    pub fn jobs(&self, state: Option<JobState>) -> SanctionResult<Vec<ReversalJob>> {
        Ok(self.jobs.list_jobs(state)?)
    }

    /// Startup recovery: drop stale leases so every pending job is armed
    /// again. Overdue jobs fire on the next tick.
    pub fn recover(&self, now: DateTime<Utc>) -> SanctionResult<RecoveryReport> {
        let released_leases = self.jobs.release_leases()?;
        let pending = self.jobs.list_jobs(Some(JobState::Pending))?;
        let exhausted = self.jobs.list_jobs(Some(JobState::Exhausted))?;

        let overdue = pending.iter().filter(|job| job.fire_at <= now).count();
        let report = RecoveryReport {
            released_leases,
            overdue,
            upcoming: pending.len() - overdue,
            exhausted: exhausted.len(),
        };

        info!(
            released_leases = report.released_leases,
            overdue = report.overdue,
            upcoming = report.upcoming,
            "Reversal jobs recovered"
        );
        for job in &exhausted {
            error!(
                sanction_id = %job.sanction_id,
                subject = %job.subject,
                attempts = job.attempts,
                error = job.last_error.as_deref().unwrap_or(""),
                "Reversal job exhausted; needs an operator"
            );
        }

        Ok(report)
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config
            .base_backoff
            .saturating_mul(factor)
            .min(self.config.max_backoff)
    }

    /// Fire every job due at `now`
    pub async fn tick(&self, now: DateTime<Utc>, handler: &dyn ReversalHandler) -> Vec<JobOutcome> {
        let lease_until = now + chrono::Duration::from_std(self.config.lease).unwrap_or_default();
        let due = match self.jobs.claim_due_jobs(now, lease_until) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to claim due reversal jobs");
                return Vec::new();
            }
        };

        if !due.is_empty() {
            debug!(count = due.len(), "Reversal jobs due");
        }

        let mut outcomes = Vec::with_capacity(due.len());
        for job in due {
            let result = handler.on_reversal_due(&job, now).await;
            if let Some(outcome) = self.settle(job, result, now) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    fn settle(
        &self,
        job: ReversalJob,
        result: SanctionResult<()>,
        now: DateTime<Utc>,
    ) -> Option<JobOutcome> {
        let ReversalJob {
            sanction_id,
            subject,
            attempts,
            ..
        } = job;

        let err = match result {
            Ok(()) => {
                // A crash before this delete re-fires the job; the handler is idempotent
                if let Err(e) = self.jobs.delete_job(sanction_id) {
                    error!(sanction_id = %sanction_id, error = %e, "Failed to delete fired job");
                }
                return Some(JobOutcome::Completed {
                    sanction_id,
                    subject,
                });
            }
            Err(e) => e,
        };

        let attempt = attempts + 1;
        let message = describe(&err);

        if attempt >= self.config.max_attempts {
            error!(
                sanction_id = %sanction_id,
                subject = %subject,
                attempts = attempt,
                error = %message,
                "Reversal retries exhausted"
            );
            if let Err(e) = self.jobs.exhaust_job(sanction_id, attempt, &message) {
                error!(sanction_id = %sanction_id, error = %e, "Failed to park exhausted job");
                return None;
            }
            return Some(JobOutcome::Exhausted {
                sanction_id,
                subject,
                attempts: attempt,
                error: message,
            });
        }

        let delay = self.backoff_for(attempt);
        let next_fire_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
        warn!(
            sanction_id = %sanction_id,
            subject = %subject,
            attempt,
            retry_in = ?delay,
            error = %message,
            "Reversal attempt failed, will retry"
        );
        if let Err(e) = self
            .jobs
            .reschedule_job(sanction_id, attempt, next_fire_at, &message)
        {
            error!(sanction_id = %sanction_id, error = %e, "Failed to reschedule job");
            return None;
        }

        Some(JobOutcome::Retrying {
            sanction_id,
            subject,
            attempt,
            next_fire_at,
            error: message,
        })
    }
}

fn describe(err: &SanctionError) -> String {
    match err {
        SanctionError::ReversalFailed { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use warden_store::SqliteStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn make_scheduler() -> (ReversalScheduler, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let config = SchedulerConfig {
            max_attempts: 3,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60),
            lease: Duration::from_secs(300),
        };
        (ReversalScheduler::new(store.clone(), config), store)
    }

    /// Fails the first `failures` calls, then succeeds
    struct FlakyHandler {
        failures: AtomicU32,
        fired: Mutex<Vec<SanctionId>>,
    }

    impl FlakyHandler {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                fired: Mutex::new(Vec::new()),
            }
        }

        fn fired(&self) -> Vec<SanctionId> {
            self.fired.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReversalHandler for FlakyHandler {
        async fn on_reversal_due(&self, job: &ReversalJob, _now: DateTime<Utc>) -> SanctionResult<()> {
            self.fired.lock().unwrap().push(job.sanction_id);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(SanctionError::ReversalFailed {
                    subject: job.subject.clone(),
                    attempts: job.attempts + 1,
                    message: "503".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let (scheduler, _) = make_scheduler();
        assert_eq!(scheduler.backoff_for(1), Duration::from_secs(30));
        assert_eq!(scheduler.backoff_for(2), Duration::from_secs(60));
        assert_eq!(scheduler.backoff_for(3), Duration::from_secs(60));
        assert_eq!(scheduler.backoff_for(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_job_fires_once_at_fire_time() {
        let (scheduler, _) = make_scheduler();
        let handler = FlakyHandler::new(0);
        let id = SanctionId::new(1);
        scheduler
            .schedule(id, &SubjectId::new("u1"), t0() + chrono::Duration::hours(1))
            .unwrap();

        assert!(scheduler.tick(t0(), &handler).await.is_empty());

        let later = t0() + chrono::Duration::hours(2);
        let outcomes = scheduler.tick(later, &handler).await;
        assert!(matches!(outcomes[..], [JobOutcome::Completed { .. }]));
        assert!(scheduler.tick(later, &handler).await.is_empty());
        assert_eq!(handler.fired(), vec![id]);
        assert!(!scheduler.is_scheduled(id).unwrap());
    }

    #[tokio::test]
    async fn test_failed_job_retries_with_backoff() {
        let (scheduler, store) = make_scheduler();
        let handler = FlakyHandler::new(1);
        let id = SanctionId::new(1);
        scheduler.schedule(id, &SubjectId::new("u1"), t0()).unwrap();

        let outcomes = scheduler.tick(t0(), &handler).await;
        match &outcomes[..] {
            [JobOutcome::Retrying { attempt, next_fire_at, error, .. }] => {
                assert_eq!(*attempt, 1);
                assert_eq!(*next_fire_at, t0() + chrono::Duration::seconds(30));
                assert_eq!(error, "503");
            }
            other => panic!("unexpected outcomes: {:?}", other),
        }

        // Not due again until the backoff elapses
        assert!(scheduler.tick(t0() + chrono::Duration::seconds(10), &handler).await.is_empty());

        let outcomes = scheduler.tick(t0() + chrono::Duration::seconds(30), &handler).await;
        assert!(matches!(outcomes[..], [JobOutcome::Completed { .. }]));
        assert!(store.get_job(id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_job_is_kept() {
        let (scheduler, _) = make_scheduler();
        let handler = FlakyHandler::new(u32::MAX);
        let id = SanctionId::new(1);
        scheduler.schedule(id, &SubjectId::new("u1"), t0()).unwrap();

        let mut now = t0();
        let mut last = Vec::new();
        for _ in 0..3 {
            last = scheduler.tick(now, &handler).await;
            now += chrono::Duration::hours(1);
        }

        assert!(matches!(
            last[..],
            [JobOutcome::Exhausted { attempts: 3, .. }]
        ));
        assert_eq!(handler.fired().len(), 3);

        let exhausted = scheduler.jobs(Some(JobState::Exhausted)).unwrap();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].last_error.as_deref(), Some("503"));

        // Parked jobs never fire again
        assert!(scheduler.tick(now + chrono::Duration::days(1), &handler).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_job() {
        let (scheduler, _) = make_scheduler();
        let handler = FlakyHandler::new(0);
        let id = SanctionId::new(1);
        scheduler.schedule(id, &SubjectId::new("u1"), t0()).unwrap();

        assert!(scheduler.cancel(id).unwrap());
        assert!(!scheduler.cancel(id).unwrap());
        assert!(scheduler.tick(t0(), &handler).await.is_empty());
    }

    #[tokio::test]
    async fn test_recover_rearms_leased_jobs() {
        let (scheduler, store) = make_scheduler();
        scheduler.schedule(SanctionId::new(1), &SubjectId::new("a"), t0()).unwrap();
        scheduler
            .schedule(SanctionId::new(2), &SubjectId::new("b"), t0() + chrono::Duration::days(1))
            .unwrap();

        // A previous process claimed job 1 and died before settling it
        let claimed = store
            .claim_due_jobs(t0(), t0() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(claimed.len(), 1);

        let report = scheduler.recover(t0()).unwrap();
        assert_eq!(report.released_leases, 1);
        assert_eq!(report.overdue, 1);
        assert_eq!(report.upcoming, 1);

        let handler = FlakyHandler::new(0);
        let outcomes = scheduler.tick(t0(), &handler).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(handler.fired(), vec![SanctionId::new(1)]);
    }
}
