//! Sanction workflow errors

use thiserror::Error;
use warden_store::StoreError;
use warden_util::{DurationError, SubjectId};

/// Outcome conditions of the sanction workflows.
///
/// Each variant is a distinct condition the front end can tell apart via
/// [`SanctionError::kind`].
#[derive(Debug, Error)]
pub enum SanctionError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(#[from] DurationError),

    #[error("Subject {0} is already sanctioned")]
    AlreadySanctioned(SubjectId),

    #[error("Subject {0} holds an exempt capability")]
    SubjectExempt(SubjectId),

    #[error("External {action} failed for {subject}: {message}")]
    ExternalActionFailed {
        subject: SubjectId,
        action: &'static str,
        message: String,
    },

    #[error("Subject {0} has no active sanction")]
    NoActiveSanction(SubjectId),

    #[error("Reversal for {subject} failed after {attempts} attempt(s): {message}")]
    ReversalFailed {
        subject: SubjectId,
        attempts: u32,
        message: String,
    },

    #[error("Audit sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Audit sink rejected event: {0}")]
    AuditRejected(String),

    #[error("Persistence error: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for SanctionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateActiveSanction(subject) => SanctionError::AlreadySanctioned(subject),
            StoreError::NoActiveSanction(subject) => SanctionError::NoActiveSanction(subject),
            other => SanctionError::Persistence(other),
        }
    }
}

impl SanctionError {
    /// Stable code for the condition
    pub fn kind(&self) -> &'static str {
        match self {
            SanctionError::InvalidDuration(_) => "invalid_duration",
            SanctionError::AlreadySanctioned(_) => "already_sanctioned",
            SanctionError::SubjectExempt(_) => "subject_exempt",
            SanctionError::ExternalActionFailed { .. } => "external_action_failed",
            SanctionError::NoActiveSanction(_) => "no_active_sanction",
            SanctionError::ReversalFailed { .. } => "reversal_failed",
            SanctionError::SinkUnavailable(_) => "sink_unavailable",
            SanctionError::AuditRejected(_) => "audit_rejected",
            SanctionError::Persistence(_) => "persistence",
        }
    }

    /// Operator-facing text for the condition
    pub fn user_message(&self) -> String {
        match self {
            SanctionError::InvalidDuration(_) => "Invalid ban duration input".to_string(),
            SanctionError::AlreadySanctioned(subject) => {
                format!("<@{}> is already temp banned!", subject)
            }
            SanctionError::SubjectExempt(_) => "You need to restrict the user first!".to_string(),
            SanctionError::ExternalActionFailed { subject, message, .. } => {
                format!("Could not ban <@{}>: {}", subject, message)
            }
            SanctionError::NoActiveSanction(subject) => {
                format!("<@{}> is not temp banned.", subject)
            }
            SanctionError::ReversalFailed { subject, message, .. } => {
                format!("Could not lift the ban on <@{}>: {}", subject, message)
            }
            SanctionError::SinkUnavailable(_) => {
                "The audit log could not be reached.".to_string()
            }
            SanctionError::AuditRejected(_) => "The audit log refused the entry.".to_string(),
            SanctionError::Persistence(_) => {
                "The ban could not be saved. An operator needs to check the logs.".to_string()
            }
        }
    }
}

pub type SanctionResult<T> = Result<T, SanctionError>;
