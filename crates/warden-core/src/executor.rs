//! Impose and reverse workflows

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use warden_api::{
    AuditEvent, AuditEventKind, JobState, NewSanction, ReversalJob, Sanction, Subject,
};
use warden_config::ExecutorConfig;
use warden_host_api::{HostError, HostResult, SubjectResolver};
use warden_store::{SanctionStore, StoreError};
use warden_util::{SanctionId, SubjectId, expiry_after, format_duration, parse_duration};

use crate::{
    AuditReporter, JobOutcome, RecoveryReport, ReversalHandler, ReversalScheduler, SanctionError,
    SanctionResult,
};

/// A request to sanction a subject, as supplied by the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImposeRequest {
    pub subject: SubjectId,
    pub actor: SubjectId,
    pub duration: String,
    pub reason: String,
}

impl ImposeRequest {
    pub fn new(
        subject: impl Into<SubjectId>,
        actor: impl Into<SubjectId>,
        duration: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            actor: actor.into(),
            duration: duration.into(),
            reason: reason.into(),
        }
    }
}

/// What became of the audit event for an impose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditDelivery {
    Logged,
    SinkUnavailable,
    Rejected,
}

impl AuditDelivery {
    fn from_report(result: &SanctionResult<()>) -> Self {
        match result {
            Ok(()) => AuditDelivery::Logged,
            Err(SanctionError::AuditRejected(_)) => AuditDelivery::Rejected,
            Err(_) => AuditDelivery::SinkUnavailable,
        }
    }
}

/// Result of a successful impose
#[derive(Debug, Clone)]
pub struct ImposeOutcome {
    pub sanction: Sanction,

    /// Offset rendered for humans
    pub duration_text: String,

    /// Whether the subject was present and the external action was applied
    pub applied: bool,

    /// Whether the pre-sanction notice reached the subject
    pub notified: bool,

    /// Whether the reversal job was stored
    pub reversal_scheduled: bool,

    /// Whether the audit sink accepted the event
    pub audit: AuditDelivery,
}

impl ImposeOutcome {
    /// True when the sanction stands but a best-effort step did not complete
    pub fn is_degraded(&self) -> bool {
        self.audit != AuditDelivery::Logged || !self.reversal_scheduled
    }

    /// Text shown to the operator who imposed the sanction
    pub fn message(&self) -> String {
        let mut message = format!(
            "<@{}> has been temporarily banned for {}.",
            self.sanction.subject, self.duration_text
        );
        match self.audit {
            AuditDelivery::Logged => {}
            AuditDelivery::SinkUnavailable => {
                message.push_str(" This hasn't been logged as the audit sink is unavailable.")
            }
            AuditDelivery::Rejected => {
                message.push_str(" This hasn't been logged as the audit sink rejected it.")
            }
        }
        if !self.reversal_scheduled {
            message.push_str(" The automatic unban will be scheduled by the running service.");
        }
        message
    }
}

/// Result of a reverse call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverseOutcome {
    /// The sanction moved to `Reversed`
    Reversed(Sanction),

    /// No open sanction; nothing to do
    NotSanctioned,
}

/// Orchestrates the sanction workflows. Holds no state of its own beyond
/// its collaborators.
pub struct SanctionExecutor {
    store: Arc<dyn SanctionStore>,
    resolver: Arc<dyn SubjectResolver>,
    scheduler: ReversalScheduler,
    reporter: AuditReporter,
    config: ExecutorConfig,
}

impl SanctionExecutor {
    pub fn new(
        store: Arc<dyn SanctionStore>,
        resolver: Arc<dyn SubjectResolver>,
        scheduler: ReversalScheduler,
        reporter: AuditReporter,
        config: ExecutorConfig,
    ) -> Self {
        info!(
            sink = reporter.sink_name(),
            action_timeout = ?config.action_timeout,
            "Sanction executor initialized"
        );

        Self {
            store,
            resolver,
            scheduler,
            reporter,
            config,
        }
    }

    pub fn scheduler(&self) -> &ReversalScheduler {
        &self.scheduler
    }

    /// Impose a time-bound sanction
    pub async fn impose(
        &self,
        request: ImposeRequest,
        now: DateTime<Utc>,
    ) -> SanctionResult<ImposeOutcome> {
        let ImposeRequest {
            subject,
            actor,
            duration,
            reason,
        } = request;

        let offset = parse_duration(&duration)?;
        let expires_at = expiry_after(now, offset)?;
        let duration_text = format_duration(offset);

        if self.store.exists(&subject)? {
            debug!(subject = %subject, "Already sanctioned");
            return Err(SanctionError::AlreadySanctioned(subject));
        }

        self.store.ensure_subject_known(&actor, now)?;

        let resolved = self
            .bounded(self.resolver.resolve(&subject))
            .await
            .map_err(|e| external_failure(&subject, "lookup", e))?;

        let mut applied = false;
        let mut notified = false;

        match resolved {
            Some(member) => {
                if self.resolver.has_exempt_capability(&member) {
                    info!(subject = %subject, actor = %actor, "Refusing to sanction exempt subject");
                    return Err(SanctionError::SubjectExempt(subject));
                }

                self.store.ensure_subject_known(&subject, now)?;

                let notice = self.config.render_notice(&duration_text, &reason);
                match self.bounded(self.resolver.notify(&member, &notice)).await {
                    Ok(()) => notified = true,
                    Err(e) => warn!(subject = %subject, error = %e, "Pre-sanction notice not delivered"),
                }

                self.bounded(self.resolver.apply_sanction(&member, &reason))
                    .await
                    .map_err(|e| external_failure(&subject, "apply", e))?;
                applied = true;
            }
            None => {
                if self.store.ensure_subject_known(&subject, now)? {
                    info!(subject = %subject, "Recorded previously unknown subject");
                }
                debug!(subject = %subject, "Subject not present; skipping external action");
            }
        }

        let sanction = match self.store.insert(NewSanction {
            subject: subject.clone(),
            actor: actor.clone(),
            reason: reason.clone(),
            imposed_at: now,
            expires_at,
        }) {
            Ok(sanction) => sanction,
            Err(StoreError::DuplicateActiveSanction(subject)) => {
                warn!(subject = %subject, "Lost race to a concurrent sanction");
                return Err(SanctionError::AlreadySanctioned(subject));
            }
            Err(e) => {
                if applied {
                    error!(
                        subject = %subject,
                        actor = %actor,
                        error = %e,
                        "External sanction applied but not recorded; reconcile manually"
                    );
                }
                return Err(SanctionError::Persistence(e));
            }
        };

        info!(
            sanction_id = %sanction.id,
            subject = %subject,
            actor = %actor,
            expires_at = %expires_at,
            applied,
            "Sanction imposed"
        );

        let reversal_scheduled = match self.scheduler.schedule(sanction.id, &subject, expires_at) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    sanction_id = %sanction.id,
                    subject = %subject,
                    error = %e,
                    "Reversal not scheduled; it will be re-armed on the next tick"
                );
                false
            }
        };

        let event = AuditEvent::new(
            subject.clone(),
            AuditEventKind::SanctionImposed {
                sanction_id: sanction.id,
                expires_at,
            },
            now,
        )
        .with_actor(actor)
        .with_reason(reason)
        .with_duration(offset);
        let audit = AuditDelivery::from_report(&self.reporter.report(event).await);

        Ok(ImposeOutcome {
            sanction,
            duration_text,
            applied,
            notified,
            reversal_scheduled,
            audit,
        })
    }

    /// Reverse the subject's open sanction.
    ///
    /// Idempotent: with no open sanction this is a no-op returning
    /// `NotSanctioned`. A failed external reversal marks the sanction
    /// `Failed` and returns `ReversalFailed`.
    pub async fn reverse(
        &self,
        subject: &SubjectId,
        now: DateTime<Utc>,
    ) -> SanctionResult<ReverseOutcome> {
        self.reverse_inner(subject, None, None, now).await
    }

    /// Operator-initiated early reversal. Cancels the pending job once the
    /// reversal is confirmed.
    pub async fn reverse_now(
        &self,
        subject: &SubjectId,
        actor: &SubjectId,
        now: DateTime<Utc>,
    ) -> SanctionResult<ReverseOutcome> {
        let outcome = self.reverse_inner(subject, None, Some(actor), now).await?;
        match &outcome {
            ReverseOutcome::Reversed(sanction) => {
                // The sanction is already closed; a leftover job finds nothing
                // open and completes as a no-op when it fires.
                if let Err(e) = self.scheduler.cancel(sanction.id) {
                    warn!(
                        sanction_id = %sanction.id,
                        subject = %subject,
                        error = %e,
                        "Reversed but the pending job could not be cancelled"
                    );
                }
            }
            ReverseOutcome::NotSanctioned => {
                return Err(SanctionError::NoActiveSanction(subject.clone()));
            }
        }
        Ok(outcome)
    }

    async fn reverse_inner(
        &self,
        subject: &SubjectId,
        expected: Option<SanctionId>,
        actor: Option<&SubjectId>,
        now: DateTime<Utc>,
    ) -> SanctionResult<ReverseOutcome> {
        let Some(sanction) = self.store.open_sanction(subject)? else {
            self.log_nothing_to_reverse(subject);
            return Ok(ReverseOutcome::NotSanctioned);
        };

        if let Some(expected) = expected
            && expected != sanction.id
        {
            debug!(
                subject = %subject,
                job_sanction = %expected,
                open_sanction = %sanction.id,
                "Job belongs to an earlier sanction; skipping"
            );
            return Ok(ReverseOutcome::NotSanctioned);
        }

        let manual = actor.is_some();

        match self.bounded(self.resolver.revert_sanction(subject)).await {
            Ok(()) => {
                let reversed = match self.store.mark_reversed(subject, now) {
                    Ok(reversed) => reversed,
                    Err(StoreError::NoActiveSanction(_)) => {
                        debug!(subject = %subject, "Reversed concurrently");
                        return Ok(ReverseOutcome::NotSanctioned);
                    }
                    Err(e) => return Err(e.into()),
                };

                info!(
                    sanction_id = %reversed.id,
                    subject = %subject,
                    manual,
                    "Sanction reversed"
                );

                let mut event = AuditEvent::new(
                    subject.clone(),
                    AuditEventKind::SanctionReversed {
                        sanction_id: reversed.id,
                        manual,
                    },
                    now,
                )
                .with_reason(reversed.reason.clone())
                .with_duration(reversed.offset());
                if let Some(actor) = actor {
                    event = event.with_actor(actor.clone());
                }
                let _ = self.reporter.report(event).await;

                Ok(ReverseOutcome::Reversed(reversed))
            }
            Err(e) => {
                let message = e.to_string();
                let attempts = match self.store.mark_failed(subject, &message) {
                    Ok(failed) => failed.failure_count,
                    Err(StoreError::NoActiveSanction(_)) => {
                        debug!(subject = %subject, "Reversed concurrently");
                        return Ok(ReverseOutcome::NotSanctioned);
                    }
                    Err(e) => return Err(e.into()),
                };

                warn!(
                    sanction_id = %sanction.id,
                    subject = %subject,
                    attempts,
                    error = %message,
                    "External reversal failed"
                );

                let event = AuditEvent::new(
                    subject.clone(),
                    AuditEventKind::ReversalAttemptFailed {
                        sanction_id: sanction.id,
                        attempt: attempts,
                        error: message.clone(),
                    },
                    now,
                );
                let _ = self.reporter.report(event).await;

                Err(SanctionError::ReversalFailed {
                    subject: subject.clone(),
                    attempts,
                    message,
                })
            }
        }
    }

    fn log_nothing_to_reverse(&self, subject: &SubjectId) {
        match self.store.history(subject) {
            Ok(history) if history.is_empty() => {
                debug!(subject = %subject, "Reverse: subject was never sanctioned")
            }
            Ok(_) => debug!(subject = %subject, "Reverse: sanction already reversed"),
            Err(e) => debug!(subject = %subject, error = %e, "Reverse: no open sanction"),
        }
    }

    /// Fire due reversals and report exhausted ones
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JobOutcome> {
        if let Err(e) = self.rearm_missing_jobs(now) {
            error!(error = %e, "Failed to re-arm missing reversal jobs");
        }
        let outcomes = self.scheduler.tick(now, self).await;

        for outcome in &outcomes {
            if let JobOutcome::Exhausted {
                sanction_id,
                subject,
                attempts,
                error,
            } = outcome
            {
                let event = AuditEvent::new(
                    subject.clone(),
                    AuditEventKind::ReversalFailed {
                        sanction_id: *sanction_id,
                        attempts: *attempts,
                        error: error.clone(),
                    },
                    now,
                );
                let _ = self.reporter.report(event).await;
            }
        }

        outcomes
    }

    /// Startup recovery: re-arm leased jobs and re-create jobs missing for
    /// open sanctions
    pub fn recover(&self, now: DateTime<Utc>) -> SanctionResult<RecoveryReport> {
        let mut report = self.scheduler.recover(now)?;
        let (overdue, upcoming) = self.rearm_missing_jobs(now)?;
        report.overdue += overdue;
        report.upcoming += upcoming;
        Ok(report)
    }

    /// Schedule a reversal for every open sanction that has no job, returning
    /// how many of those were already overdue and how many are upcoming
    fn rearm_missing_jobs(&self, now: DateTime<Utc>) -> SanctionResult<(usize, usize)> {
        let mut overdue = 0;
        let mut upcoming = 0;

        for sanction in self.store.open_sanctions()? {
            if self.scheduler.is_scheduled(sanction.id)? {
                continue;
            }
            warn!(
                sanction_id = %sanction.id,
                subject = %sanction.subject,
                "Open sanction without a reversal job; re-arming"
            );
            self.scheduler
                .schedule(sanction.id, &sanction.subject, sanction.expires_at)?;
            if sanction.expires_at <= now {
                overdue += 1;
            } else {
                upcoming += 1;
            }
        }

        Ok((overdue, upcoming))
    }

    /// The subject's open sanction, if any
    pub fn status(&self, subject: &SubjectId) -> SanctionResult<Option<Sanction>> {
        Ok(self.store.open_sanction(subject)?)
    }

    /// The subject's ledger entry, if it has ever been sanctioned or acted
    pub fn subject(&self, subject: &SubjectId) -> SanctionResult<Option<Subject>> {
        Ok(self.store.subject(subject)?)
    }

    pub fn history(&self, subject: &SubjectId) -> SanctionResult<Vec<Sanction>> {
        Ok(self.store.history(subject)?)
    }

    pub fn jobs(&self, state: Option<JobState>) -> SanctionResult<Vec<ReversalJob>> {
        self.scheduler.jobs(state)
    }

    async fn bounded<T>(&self, fut: impl Future<Output = HostResult<T>>) -> HostResult<T> {
        bounded(self.config.action_timeout, fut).await
    }
}

#[async_trait]
impl ReversalHandler for SanctionExecutor {
    async fn on_reversal_due(&self, job: &ReversalJob, now: DateTime<Utc>) -> SanctionResult<()> {
        self.reverse_inner(&job.subject, Some(job.sanction_id), None, now)
            .await
            .map(|_| ())
    }
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = HostResult<T>>) -> HostResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(HostError::Timeout(limit)),
    }
}

fn external_failure(subject: &SubjectId, action: &'static str, e: HostError) -> SanctionError {
    warn!(subject = %subject, action, error = %e, "External action failed");
    SanctionError::ExternalActionFailed {
        subject: subject.clone(),
        action,
        message: e.to_string(),
    }
}
