//! Collaborator traits

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use warden_api::AuditEvent;
use warden_util::SubjectId;

/// Errors from resolver and external action calls
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Subject not found")]
    NotFound,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// A subject resolved against the live domain (e.g. a current guild member)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubject {
    pub id: SubjectId,

    /// Name for display in notices and logs
    pub display_name: Option<String>,

    /// Capabilities (roles) the subject currently holds
    pub capabilities: Vec<String>,
}

impl ResolvedSubject {
    pub fn new(id: SubjectId) -> Self {
        Self {
            id,
            display_name: None,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// Resolves subjects and performs the external sanction actions.
///
/// Implementations own any caching; callers see a single `resolve` whose
/// contract already covers the cache-then-remote fallback.
#[async_trait]
pub trait SubjectResolver: Send + Sync {
    /// Resolve a subject's live state. `Ok(None)` means it is no longer present.
    async fn resolve(&self, id: &SubjectId) -> HostResult<Option<ResolvedSubject>>;

    /// Whether the subject holds a protected status that forbids sanctioning
    fn has_exempt_capability(&self, subject: &ResolvedSubject) -> bool;

    /// Apply the sanction externally
    async fn apply_sanction(&self, subject: &ResolvedSubject, reason: &str) -> HostResult<()>;

    /// Undo the sanction externally. Takes an id: the subject is usually not
    /// resolvable while sanctioned.
    async fn revert_sanction(&self, id: &SubjectId) -> HostResult<()>;

    /// Best-effort message to the subject
    async fn notify(&self, subject: &ResolvedSubject, message: &str) -> HostResult<()>;
}

/// Errors from audit delivery
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit sink rejected event: {0}")]
    Rejected(String),
}

/// External destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Deliver one event
    async fn deliver(&self, event: &AuditEvent) -> Result<(), SinkError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_subject_builder() {
        let subject = ResolvedSubject::new(SubjectId::new("u1")).with_capability("vegan");
        assert_eq!(subject.capabilities, vec!["vegan".to_string()]);
        assert!(subject.display_name.is_none());
    }
}
