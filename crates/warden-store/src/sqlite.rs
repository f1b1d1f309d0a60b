//! SQLite-based store implementation

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use warden_api::{JobState, NewSanction, ReversalJob, Sanction, SanctionStatus, Subject};
use warden_util::{SanctionId, SubjectId, format_timestamp, parse_timestamp};

use crate::{JobStore, SanctionStore, StoreError, StoreResult};

const SANCTION_COLUMNS: &str = "id, subject_id, actor_id, reason, imposed_at, expires_at, \
     status, resolved_at, failure_count, last_error";

const JOB_COLUMNS: &str = "sanction_id, subject_id, fire_at, attempts, state, last_error";

/// SQLite-based store.
///
/// A single connection behind a mutex: every trait method runs under the
/// lock, which is what makes check-then-write sequences atomic.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Subjects ever referenced (never deleted)
            CREATE TABLE IF NOT EXISTS subjects (
                id TEXT PRIMARY KEY,
                first_seen TEXT NOT NULL
            );

            -- Sanctions, kept after reversal as history
            CREATE TABLE IF NOT EXISTS sanctions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                imposed_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                status TEXT NOT NULL,
                resolved_at TEXT,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            );

            -- At most one open sanction per subject
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sanctions_open_subject
                ON sanctions(subject_id) WHERE status IN ('active', 'failed');

            CREATE INDEX IF NOT EXISTS idx_sanctions_subject ON sanctions(subject_id);

            -- Durable reversal jobs, one per open sanction
            CREATE TABLE IF NOT EXISTS reversal_jobs (
                sanction_id INTEGER PRIMARY KEY,
                subject_id TEXT NOT NULL,
                fire_at TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'pending',
                leased_until TEXT,
                last_error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_due ON reversal_jobs(state, fire_at);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

/// Column values of a `sanctions` row before parsing
struct SanctionRow {
    id: i64,
    subject_id: String,
    actor_id: String,
    reason: String,
    imposed_at: String,
    expires_at: String,
    status: String,
    resolved_at: Option<String>,
    failure_count: u32,
    last_error: Option<String>,
}

impl SanctionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            actor_id: row.get(2)?,
            reason: row.get(3)?,
            imposed_at: row.get(4)?,
            expires_at: row.get(5)?,
            status: row.get(6)?,
            resolved_at: row.get(7)?,
            failure_count: row.get(8)?,
            last_error: row.get(9)?,
        })
    }

    fn into_sanction(self) -> StoreResult<Sanction> {
        let status = self
            .status
            .parse::<SanctionStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Sanction {
            id: SanctionId::new(self.id),
            subject: SubjectId::new(self.subject_id),
            actor: SubjectId::new(self.actor_id),
            reason: self.reason,
            imposed_at: timestamp(&self.imposed_at)?,
            expires_at: timestamp(&self.expires_at)?,
            status,
            resolved_at: self.resolved_at.as_deref().map(timestamp).transpose()?,
            failure_count: self.failure_count,
            last_error: self.last_error,
        })
    }
}

struct JobRow {
    sanction_id: i64,
    subject_id: String,
    fire_at: String,
    attempts: u32,
    state: String,
    last_error: Option<String>,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sanction_id: row.get(0)?,
            subject_id: row.get(1)?,
            fire_at: row.get(2)?,
            attempts: row.get(3)?,
            state: row.get(4)?,
            last_error: row.get(5)?,
        })
    }

    fn into_job(self) -> StoreResult<ReversalJob> {
        let state = self
            .state
            .parse::<JobState>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(ReversalJob {
            sanction_id: SanctionId::new(self.sanction_id),
            subject: SubjectId::new(self.subject_id),
            fire_at: timestamp(&self.fire_at)?,
            attempts: self.attempts,
            state,
            last_error: self.last_error,
        })
    }
}

fn timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    parse_timestamp(s).ok_or_else(|| StoreError::Serialization(format!("bad timestamp '{}'", s)))
}

fn open_sanction_in(tx: &Transaction<'_>, subject: &SubjectId) -> StoreResult<Option<Sanction>> {
    let sql = format!(
        "SELECT {} FROM sanctions WHERE subject_id = ? AND status IN ('active', 'failed')",
        SANCTION_COLUMNS
    );
    tx.query_row(&sql, [subject.as_str()], SanctionRow::read)
        .optional()?
        .map(SanctionRow::into_sanction)
        .transpose()
}

fn sanction_by_id(conn: &Connection, id: i64) -> StoreResult<Option<Sanction>> {
    let sql = format!("SELECT {} FROM sanctions WHERE id = ?", SANCTION_COLUMNS);
    conn.query_row(&sql, [id], SanctionRow::read)
        .optional()?
        .map(SanctionRow::into_sanction)
        .transpose()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

impl SanctionStore for SqliteStore {
    fn exists(&self, subject: &SubjectId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sanctions WHERE subject_id = ? AND status IN ('active', 'failed')",
                [subject.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, sanction: NewSanction) -> StoreResult<Sanction> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if open_sanction_in(&tx, &sanction.subject)?.is_some() {
            return Err(StoreError::DuplicateActiveSanction(sanction.subject));
        }

        let created = tx.execute(
            "INSERT OR IGNORE INTO subjects (id, first_seen) VALUES (?, ?)",
            params![sanction.subject.as_str(), format_timestamp(&sanction.imposed_at)],
        )?;
        if created > 0 {
            debug!(subject = %sanction.subject, "Subject recorded on first sanction");
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO sanctions (subject_id, actor_id, reason, imposed_at, expires_at, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                sanction.subject.as_str(),
                sanction.actor.as_str(),
                sanction.reason,
                format_timestamp(&sanction.imposed_at),
                format_timestamp(&sanction.expires_at),
                SanctionStatus::Active.as_str(),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StoreError::DuplicateActiveSanction(sanction.subject));
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(subject = %sanction.subject, sanction_id = id, "Sanction inserted");

        sanction_by_id(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("sanction {}", id)))
    }

    fn open_sanction(&self, subject: &SubjectId) -> StoreResult<Option<Sanction>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let sanction = open_sanction_in(&tx, subject)?;
        tx.commit()?;
        Ok(sanction)
    }

    fn mark_reversed(&self, subject: &SubjectId, at: DateTime<Utc>) -> StoreResult<Sanction> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(open) = open_sanction_in(&tx, subject)? else {
            return Err(StoreError::NoActiveSanction(subject.clone()));
        };

        let updated = tx.execute(
            r#"
            UPDATE sanctions SET status = ?, resolved_at = ?
            WHERE id = ? AND status IN ('active', 'failed')
            "#,
            params![
                SanctionStatus::Reversed.as_str(),
                format_timestamp(&at),
                open.id.get()
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NoActiveSanction(subject.clone()));
        }
        tx.commit()?;

        debug!(subject = %subject, sanction_id = %open.id, "Sanction marked reversed");
        sanction_by_id(&conn, open.id.get())?
            .ok_or_else(|| StoreError::NotFound(format!("sanction {}", open.id)))
    }

    fn mark_failed(&self, subject: &SubjectId, error: &str) -> StoreResult<Sanction> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(open) = open_sanction_in(&tx, subject)? else {
            return Err(StoreError::NoActiveSanction(subject.clone()));
        };

        let updated = tx.execute(
            r#"
            UPDATE sanctions
            SET status = ?, failure_count = failure_count + 1, last_error = ?
            WHERE id = ? AND status IN ('active', 'failed')
            "#,
            params![SanctionStatus::Failed.as_str(), error, open.id.get()],
        )?;
        if updated == 0 {
            return Err(StoreError::NoActiveSanction(subject.clone()));
        }
        tx.commit()?;

        debug!(subject = %subject, sanction_id = %open.id, error, "Sanction marked failed");
        sanction_by_id(&conn, open.id.get())?
            .ok_or_else(|| StoreError::NotFound(format!("sanction {}", open.id)))
    }

    fn ensure_subject_known(&self, subject: &SubjectId, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn()?;
        let created = conn.execute(
            "INSERT OR IGNORE INTO subjects (id, first_seen) VALUES (?, ?)",
            params![subject.as_str(), format_timestamp(&at)],
        )?;
        if created > 0 {
            debug!(subject = %subject, "Subject recorded");
        }
        Ok(created > 0)
    }

    fn subject(&self, subject: &SubjectId) -> StoreResult<Option<Subject>> {
        let conn = self.conn()?;
        let first_seen: Option<String> = conn
            .query_row(
                "SELECT first_seen FROM subjects WHERE id = ?",
                [subject.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        first_seen
            .map(|first_seen| {
                Ok(Subject {
                    id: subject.clone(),
                    first_seen: timestamp(&first_seen)?,
                })
            })
            .transpose()
    }

    fn history(&self, subject: &SubjectId) -> StoreResult<Vec<Sanction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sanctions WHERE subject_id = ? ORDER BY id DESC",
            SANCTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([subject.as_str()], SanctionRow::read)?;

        let mut sanctions = Vec::new();
        for row in rows {
            sanctions.push(row?.into_sanction()?);
        }
        Ok(sanctions)
    }

    fn open_sanctions(&self) -> StoreResult<Vec<Sanction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sanctions WHERE status IN ('active', 'failed') ORDER BY expires_at",
            SANCTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], SanctionRow::read)?;

        let mut sanctions = Vec::new();
        for row in rows {
            sanctions.push(row?.into_sanction()?);
        }
        Ok(sanctions)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

impl JobStore for SqliteStore {
    fn upsert_job(
        &self,
        sanction_id: SanctionId,
        subject: &SubjectId,
        fire_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO reversal_jobs (sanction_id, subject_id, fire_at, attempts, state)
            VALUES (?, ?, ?, 0, 'pending')
            ON CONFLICT(sanction_id)
            DO UPDATE SET subject_id = excluded.subject_id, fire_at = excluded.fire_at,
                          attempts = 0, state = 'pending', leased_until = NULL, last_error = NULL
            "#,
            params![sanction_id.get(), subject.as_str(), format_timestamp(&fire_at)],
        )?;

        debug!(sanction_id = %sanction_id, subject = %subject, fire_at = %fire_at, "Job stored");
        Ok(())
    }

    fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<ReversalJob>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now_str = format_timestamp(&now);

        let jobs = {
            let sql = format!(
                r#"
                SELECT {} FROM reversal_jobs
                WHERE state = 'pending' AND fire_at <= ?1
                  AND (leased_until IS NULL OR leased_until <= ?1)
                ORDER BY fire_at
                "#,
                JOB_COLUMNS
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map([&now_str], JobRow::read)?;

            let mut jobs = Vec::new();
            for row in rows {
                jobs.push(row?.into_job()?);
            }
            jobs
        };

        let lease_str = format_timestamp(&lease_until);
        for job in &jobs {
            tx.execute(
                "UPDATE reversal_jobs SET leased_until = ? WHERE sanction_id = ?",
                params![lease_str, job.sanction_id.get()],
            )?;
        }
        tx.commit()?;

        if !jobs.is_empty() {
            debug!(count = jobs.len(), "Claimed due reversal jobs");
        }
        Ok(jobs)
    }

    fn delete_job(&self, sanction_id: SanctionId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM reversal_jobs WHERE sanction_id = ?",
            [sanction_id.get()],
        )?;
        Ok(deleted > 0)
    }

    fn reschedule_job(
        &self,
        sanction_id: SanctionId,
        attempts: u32,
        fire_at: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE reversal_jobs
            SET attempts = ?, fire_at = ?, last_error = ?, leased_until = NULL
            WHERE sanction_id = ?
            "#,
            params![attempts, format_timestamp(&fire_at), error, sanction_id.get()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("reversal job {}", sanction_id)));
        }
        Ok(())
    }

    fn exhaust_job(&self, sanction_id: SanctionId, attempts: u32, error: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE reversal_jobs
            SET attempts = ?, state = 'exhausted', last_error = ?, leased_until = NULL
            WHERE sanction_id = ?
            "#,
            params![attempts, error, sanction_id.get()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("reversal job {}", sanction_id)));
        }
        Ok(())
    }

    fn release_leases(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let released = conn.execute(
            "UPDATE reversal_jobs SET leased_until = NULL WHERE leased_until IS NOT NULL",
            [],
        )?;
        Ok(released)
    }

    fn get_job(&self, sanction_id: SanctionId) -> StoreResult<Option<ReversalJob>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM reversal_jobs WHERE sanction_id = ?", JOB_COLUMNS);
        conn.query_row(&sql, [sanction_id.get()], JobRow::read)
            .optional()?
            .map(JobRow::into_job)
            .transpose()
    }

    fn list_jobs(&self, state: Option<JobState>) -> StoreResult<Vec<ReversalJob>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM reversal_jobs WHERE ?1 IS NULL OR state = ?1 ORDER BY fire_at",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([state.map(|s| s.as_str())], JobRow::read)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?.into_job()?);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn new_sanction(subject: &str) -> NewSanction {
        NewSanction {
            subject: SubjectId::new(subject),
            actor: SubjectId::new("mod-1"),
            reason: "spam".into(),
            imposed_at: t0(),
            expires_at: t0() + Duration::days(1),
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn insert_creates_subject_and_active_sanction() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("u1");
        assert!(!store.is_known(&subject).unwrap());

        let sanction = store.insert(new_sanction("u1")).unwrap();

        assert_eq!(sanction.status, SanctionStatus::Active);
        assert_eq!(sanction.expires_at, t0() + Duration::days(1));
        assert!(store.exists(&subject).unwrap());
        assert!(store.is_known(&subject).unwrap());
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert(new_sanction("u1")).unwrap();

        let err = store.insert(new_sanction("u1")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateActiveSanction(s) if s.as_str() == "u1"));
        assert_eq!(store.history(&SubjectId::new("u1")).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_inserts_yield_one_winner() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.insert(new_sanction("u1")))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::DuplicateActiveSanction(_))))
            .count();

        assert_eq!(ok, 1);
        assert_eq!(dup, 7);
    }

    #[test]
    fn mark_reversed_is_compare_and_swap() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("u1");
        store.insert(new_sanction("u1")).unwrap();

        let reversed = store.mark_reversed(&subject, t0() + Duration::hours(25)).unwrap();
        assert_eq!(reversed.status, SanctionStatus::Reversed);
        assert_eq!(reversed.resolved_at, Some(t0() + Duration::hours(25)));
        assert!(!store.exists(&subject).unwrap());

        let again = store.mark_reversed(&subject, t0()).unwrap_err();
        assert!(matches!(again, StoreError::NoActiveSanction(_)));

        // History retained
        let history = store.history(&subject).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SanctionStatus::Reversed);
    }

    #[test]
    fn failed_sanction_stays_open_until_reversed() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("u1");
        store.insert(new_sanction("u1")).unwrap();

        let failed = store.mark_failed(&subject, "timeout").unwrap();
        assert_eq!(failed.status, SanctionStatus::Failed);
        assert_eq!(failed.failure_count, 1);
        assert_eq!(failed.last_error.as_deref(), Some("timeout"));
        assert!(store.exists(&subject).unwrap());

        let failed = store.mark_failed(&subject, "timeout again").unwrap();
        assert_eq!(failed.failure_count, 2);

        let reversed = store.mark_reversed(&subject, t0()).unwrap();
        assert_eq!(reversed.status, SanctionStatus::Reversed);
        assert_eq!(reversed.failure_count, 2);
    }

    #[test]
    fn mark_failed_without_sanction_errors() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.mark_failed(&SubjectId::new("nobody"), "x").unwrap_err();
        assert!(matches!(err, StoreError::NoActiveSanction(_)));
    }

    #[test]
    fn new_sanction_allowed_after_reversal() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("u1");
        store.insert(new_sanction("u1")).unwrap();
        store.mark_reversed(&subject, t0()).unwrap();

        store.insert(new_sanction("u1")).unwrap();
        let history = store.history(&subject).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, SanctionStatus::Active);
    }

    #[test]
    fn open_sanctions_lists_active_and_failed() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert(new_sanction("a")).unwrap();
        store.insert(new_sanction("b")).unwrap();
        store.insert(new_sanction("c")).unwrap();
        store.mark_failed(&SubjectId::new("b"), "timeout").unwrap();
        store.mark_reversed(&SubjectId::new("c"), t0()).unwrap();

        let mut open: Vec<String> = store
            .open_sanctions()
            .unwrap()
            .into_iter()
            .map(|s| s.subject.to_string())
            .collect();
        open.sort();
        assert_eq!(open, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn ensure_subject_known_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("mod-1");

        assert!(store.subject(&subject).unwrap().is_none());
        assert!(store.ensure_subject_known(&subject, t0()).unwrap());
        assert!(!store
            .ensure_subject_known(&subject, t0() + Duration::days(3))
            .unwrap());
        assert!(store.is_known(&subject).unwrap());
        assert!(!store.exists(&subject).unwrap());

        // First sighting is kept
        let recorded = store.subject(&subject).unwrap().unwrap();
        assert_eq!(recorded.first_seen, t0());
    }

    #[test]
    fn due_jobs_are_claimed_once_per_lease() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("u1");
        let sanction = store.insert(new_sanction("u1")).unwrap();
        let fire_at = t0() + Duration::days(1);
        store.upsert_job(sanction.id, &subject, fire_at).unwrap();

        // Not yet due
        let lease = t0() + Duration::minutes(5);
        assert!(store.claim_due_jobs(t0(), lease).unwrap().is_empty());

        let now = fire_at + Duration::seconds(1);
        let lease = now + Duration::minutes(5);
        let claimed = store.claim_due_jobs(now, lease).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].subject, subject);

        // Leased: a second tick sees nothing
        assert!(store.claim_due_jobs(now, lease).unwrap().is_empty());

        // Recovery drops leases so the job is claimable again
        assert_eq!(store.release_leases().unwrap(), 1);
        assert_eq!(store.claim_due_jobs(now, lease).unwrap().len(), 1);
    }

    #[test]
    fn reschedule_and_exhaust_jobs() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("u1");
        let id = SanctionId::new(1);
        store.upsert_job(id, &subject, t0()).unwrap();

        let retry_at = t0() + Duration::seconds(30);
        store.reschedule_job(id, 1, retry_at, "timeout").unwrap();
        let job = store.get_job(id).unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.fire_at, retry_at);
        assert_eq!(job.last_error.as_deref(), Some("timeout"));

        store.exhaust_job(id, 5, "still down").unwrap();
        let job = store.get_job(id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Exhausted);

        // Exhausted jobs are never claimed
        let far = t0() + Duration::days(365);
        assert!(store.claim_due_jobs(far, far).unwrap().is_empty());
        assert_eq!(store.list_jobs(Some(JobState::Exhausted)).unwrap().len(), 1);
        assert!(store.list_jobs(Some(JobState::Pending)).unwrap().is_empty());
        assert_eq!(store.list_jobs(None).unwrap().len(), 1);
    }

    #[test]
    fn delete_job_reports_presence() {
        let store = SqliteStore::in_memory().unwrap();
        let id = SanctionId::new(3);
        store.upsert_job(id, &SubjectId::new("u3"), t0()).unwrap();

        assert!(store.delete_job(id).unwrap());
        assert!(!store.delete_job(id).unwrap());
        assert!(store.get_job(id).unwrap().is_none());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.db");
        let subject = SubjectId::new("u1");

        {
            let store = SqliteStore::open(&path).unwrap();
            let sanction = store.insert(new_sanction("u1")).unwrap();
            store
                .upsert_job(sanction.id, &subject, sanction.expires_at)
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.exists(&subject).unwrap());
        let jobs = store.list_jobs(Some(JobState::Pending)).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].fire_at, t0() + Duration::days(1));
    }
}
