//! Store trait definitions

use chrono::{DateTime, Utc};
use warden_api::{JobState, NewSanction, ReversalJob, Sanction, Subject};
use warden_util::{SanctionId, SubjectId};

use crate::StoreResult;

/// Durable record of subjects and sanctions.
///
/// Every method is a single transactional step; in particular `insert`
/// performs its duplicate check and the write atomically.
pub trait SanctionStore: Send + Sync {
    /// True if the subject holds an open (active or failed) sanction
    fn exists(&self, subject: &SubjectId) -> StoreResult<bool>;

    /// Persist a new sanction, creating the subject record if needed.
    ///
    /// Fails with `DuplicateActiveSanction` if the subject already holds one.
    fn insert(&self, sanction: NewSanction) -> StoreResult<Sanction>;

    /// The subject's open sanction, if any
    fn open_sanction(&self, subject: &SubjectId) -> StoreResult<Option<Sanction>>;

    /// Compare-and-swap the open sanction to `Reversed`.
    ///
    /// Fails with `NoActiveSanction` if none is open, so a second call is an
    /// error rather than a crash.
    fn mark_reversed(&self, subject: &SubjectId, at: DateTime<Utc>) -> StoreResult<Sanction>;

    /// Compare-and-swap the open sanction to `Failed`, recording the error
    fn mark_failed(&self, subject: &SubjectId, error: &str) -> StoreResult<Sanction>;

    /// Record that the subject exists. Returns true if it was previously unknown.
    fn ensure_subject_known(&self, subject: &SubjectId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// The subject's ledger entry, if it has ever been recorded
    fn subject(&self, subject: &SubjectId) -> StoreResult<Option<Subject>>;

    /// Whether the subject has ever been recorded
    fn is_known(&self, subject: &SubjectId) -> StoreResult<bool> {
        Ok(self.subject(subject)?.is_some())
    }

    /// All sanctions for a subject, newest first
    fn history(&self, subject: &SubjectId) -> StoreResult<Vec<Sanction>>;

    /// Every open sanction, soonest expiry first
    fn open_sanctions(&self) -> StoreResult<Vec<Sanction>>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Durable storage behind the reversal scheduler
pub trait JobStore: Send + Sync {
    /// Create or replace the job for a sanction, resetting attempts
    fn upsert_job(
        &self,
        sanction_id: SanctionId,
        subject: &SubjectId,
        fire_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Lease every pending job due at `now` that is not already leased.
    /// Leased jobs are hidden from further claims until `lease_until`.
    fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<ReversalJob>>;

    /// Delete a job. Returns false if it did not exist.
    fn delete_job(&self, sanction_id: SanctionId) -> StoreResult<bool>;

    /// Record a failed attempt and push the job to `fire_at`, releasing its lease
    fn reschedule_job(
        &self,
        sanction_id: SanctionId,
        attempts: u32,
        fire_at: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()>;

    /// Park a job that has used up its retries
    fn exhaust_job(&self, sanction_id: SanctionId, attempts: u32, error: &str) -> StoreResult<()>;

    /// Drop all leases (startup recovery: nobody can still hold one)
    fn release_leases(&self) -> StoreResult<usize>;

    /// Fetch one job
    fn get_job(&self, sanction_id: SanctionId) -> StoreResult<Option<ReversalJob>>;

    /// List jobs, optionally filtered by state, ordered by fire time
    fn list_jobs(&self, state: Option<JobState>) -> StoreResult<Vec<ReversalJob>>;
}
