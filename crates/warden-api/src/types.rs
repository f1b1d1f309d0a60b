//! Sanction and reversal job types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use warden_util::{SanctionId, SubjectId};

/// Lifecycle status of a sanction.
///
/// `Active -> Reversed` on confirmed reversal, `Active -> Failed` when the
/// external reversal could not be confirmed. A `Failed` sanction is still
/// open: the subject remains sanctioned externally and the reversal is
/// retried, so `Failed -> Reversed` and `Failed -> Failed` are legal too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionStatus {
    Active,
    Reversed,
    Failed,
}

impl SanctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanctionStatus::Active => "active",
            SanctionStatus::Reversed => "reversed",
            SanctionStatus::Failed => "failed",
        }
    }

    /// Whether the sanction still holds the subject's slot
    pub fn is_open(&self) -> bool {
        matches!(self, SanctionStatus::Active | SanctionStatus::Failed)
    }
}

impl fmt::Display for SanctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for SanctionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SanctionStatus::Active),
            "reversed" => Ok(SanctionStatus::Reversed),
            "failed" => Ok(SanctionStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A sanction about to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSanction {
    pub subject: SubjectId,
    pub actor: SubjectId,
    pub reason: String,
    pub imposed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewSanction {
    /// Offset between imposition and expiry
    pub fn offset(&self) -> Duration {
        (self.expires_at - self.imposed_at).to_std().unwrap_or_default()
    }
}

/// A persisted sanction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sanction {
    pub id: SanctionId,
    pub subject: SubjectId,
    pub actor: SubjectId,
    pub reason: String,
    pub imposed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SanctionStatus,

    /// When the sanction reached `Reversed`
    pub resolved_at: Option<DateTime<Utc>>,

    /// Number of unconfirmed reversal attempts
    pub failure_count: u32,

    /// Last reversal error, kept for the audit trail
    pub last_error: Option<String>,
}

impl Sanction {
    pub fn offset(&self) -> Duration {
        (self.expires_at - self.imposed_at).to_std().unwrap_or_default()
    }
}

/// A subject known to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub first_seen: DateTime<Utc>,
}

/// State of a durable reversal job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for `fire_at` (or for its next retry)
    Pending,
    /// Retries used up; kept for operator follow-up
    Exhausted,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Exhausted => "exhausted",
        }
    }
}

impl FromStr for JobState {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "exhausted" => Ok(JobState::Exhausted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A durable one-shot reversal schedule entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalJob {
    pub sanction_id: SanctionId,
    pub subject: SubjectId,
    pub fire_at: DateTime<Utc>,
    pub attempts: u32,
    pub state: JobState,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SanctionStatus::Active,
            SanctionStatus::Reversed,
            SanctionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SanctionStatus>(), Ok(status));
        }
        assert!("pending".parse::<SanctionStatus>().is_err());
    }

    #[test]
    fn failed_sanction_is_still_open() {
        assert!(SanctionStatus::Active.is_open());
        assert!(SanctionStatus::Failed.is_open());
        assert!(!SanctionStatus::Reversed.is_open());
    }

    #[test]
    fn offset_is_expiry_minus_imposition() {
        let imposed_at = Utc::now();
        let sanction = NewSanction {
            subject: SubjectId::new("u1"),
            actor: SubjectId::new("m1"),
            reason: "spam".into(),
            imposed_at,
            expires_at: imposed_at + chrono::Duration::hours(2),
        };
        assert_eq!(sanction.offset(), Duration::from_secs(7_200));
    }
}
