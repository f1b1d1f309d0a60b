//! Audit event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_util::{EventId, SanctionId, SubjectId, format_duration};

/// Lifecycle transition being reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Sanction committed and reversal scheduled
    SanctionImposed {
        sanction_id: SanctionId,
        expires_at: DateTime<Utc>,
    },

    /// Sanction reversed, automatically or by an operator
    SanctionReversed {
        sanction_id: SanctionId,
        manual: bool,
    },

    /// One reversal attempt failed; the scheduler will retry
    ReversalAttemptFailed {
        sanction_id: SanctionId,
        attempt: u32,
        error: String,
    },

    /// Retries exhausted; needs an operator
    ReversalFailed {
        sanction_id: SanctionId,
        attempts: u32,
        error: String,
    },
}

impl AuditEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEventKind::SanctionImposed { .. } => "sanction_imposed",
            AuditEventKind::SanctionReversed { .. } => "sanction_reversed",
            AuditEventKind::ReversalAttemptFailed { .. } => "reversal_attempt_failed",
            AuditEventKind::ReversalFailed { .. } => "reversal_failed",
        }
    }

    /// Whether the transition this event describes succeeded
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AuditEventKind::SanctionImposed { .. } | AuditEventKind::SanctionReversed { .. }
        )
    }
}

/// Ephemeral record handed to the audit sink. Not persisted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub subject: SubjectId,
    pub actor: Option<SubjectId>,
    pub reason: Option<String>,
    pub duration: Option<Duration>,
    pub kind: AuditEventKind,
}

impl AuditEvent {
    pub fn new(subject: SubjectId, kind: AuditEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            timestamp,
            subject,
            actor: None,
            reason: None,
            duration: None,
            kind,
        }
    }

    pub fn with_actor(mut self, actor: SubjectId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Duration rendered for humans, if the event carries one
    pub fn duration_text(&self) -> Option<String> {
        self.duration.map(format_duration)
    }
}
