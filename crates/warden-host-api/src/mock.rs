//! Mock collaborators for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warden_api::AuditEvent;
use warden_util::SubjectId;

use crate::{AuditSink, HostError, HostResult, ResolvedSubject, SinkError, SubjectResolver};

/// Capability that makes a mock subject exempt
pub const MOCK_EXEMPT_CAPABILITY: &str = "exempt";

/// In-memory resolver with failure switches
pub struct MockResolver {
    subjects: Arc<Mutex<HashMap<SubjectId, ResolvedSubject>>>,
    sanctioned: Arc<Mutex<Vec<SubjectId>>>,
    notices: Arc<Mutex<Vec<(SubjectId, String)>>>,
    apply_calls: AtomicU32,
    revert_calls: AtomicU32,

    /// Configure apply to fail
    pub fail_apply: Arc<Mutex<bool>>,

    /// Number of upcoming revert calls that fail
    pub fail_reverts: Arc<AtomicU32>,

    /// Configure notify to fail
    pub fail_notify: Arc<Mutex<bool>>,

    /// Delay injected into apply/revert (to exercise timeouts)
    pub action_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            subjects: Arc::new(Mutex::new(HashMap::new())),
            sanctioned: Arc::new(Mutex::new(Vec::new())),
            notices: Arc::new(Mutex::new(Vec::new())),
            apply_calls: AtomicU32::new(0),
            revert_calls: AtomicU32::new(0),
            fail_apply: Arc::new(Mutex::new(false)),
            fail_reverts: Arc::new(AtomicU32::new(0)),
            fail_notify: Arc::new(Mutex::new(false)),
            action_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Make a subject resolvable
    pub fn add_subject(&self, id: impl Into<SubjectId>) {
        let id = id.into();
        self.subjects
            .lock()
            .unwrap()
            .insert(id.clone(), ResolvedSubject::new(id));
    }

    /// Make a subject resolvable and exempt
    pub fn add_exempt_subject(&self, id: impl Into<SubjectId>) {
        let id = id.into();
        self.subjects.lock().unwrap().insert(
            id.clone(),
            ResolvedSubject::new(id).with_capability(MOCK_EXEMPT_CAPABILITY),
        );
    }

    /// Subjects currently sanctioned externally
    pub fn sanctioned(&self) -> Vec<SubjectId> {
        self.sanctioned.lock().unwrap().clone()
    }

    /// Notices delivered so far
    pub fn notices(&self) -> Vec<(SubjectId, String)> {
        self.notices.lock().unwrap().clone()
    }

    pub fn apply_calls(&self) -> u32 {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn revert_calls(&self) -> u32 {
        self.revert_calls.load(Ordering::SeqCst)
    }

    async fn maybe_delay(&self) {
        let delay = *self.action_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubjectResolver for MockResolver {
    async fn resolve(&self, id: &SubjectId) -> HostResult<Option<ResolvedSubject>> {
        Ok(self.subjects.lock().unwrap().get(id).cloned())
    }

    fn has_exempt_capability(&self, subject: &ResolvedSubject) -> bool {
        subject
            .capabilities
            .iter()
            .any(|c| c == MOCK_EXEMPT_CAPABILITY)
    }

    async fn apply_sanction(&self, subject: &ResolvedSubject, _reason: &str) -> HostResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;

        if *self.fail_apply.lock().unwrap() {
            return Err(HostError::Rejected("Mock apply failure".into()));
        }

        self.sanctioned.lock().unwrap().push(subject.id.clone());
        // A sanctioned subject is no longer present
        self.subjects.lock().unwrap().remove(&subject.id);
        Ok(())
    }

    async fn revert_sanction(&self, id: &SubjectId) -> HostResult<()> {
        self.revert_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;

        let should_fail = self
            .fail_reverts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(HostError::Http("Mock revert failure".into()));
        }

        self.sanctioned.lock().unwrap().retain(|s| s != id);
        Ok(())
    }

    async fn notify(&self, subject: &ResolvedSubject, message: &str) -> HostResult<()> {
        if *self.fail_notify.lock().unwrap() {
            return Err(HostError::Rejected("Mock notify failure".into()));
        }
        self.notices
            .lock()
            .unwrap()
            .push((subject.id.clone(), message.to_string()));
        Ok(())
    }
}

/// Audit sink that records events in memory
pub struct MockSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,

    /// Configure the sink to report itself unavailable
    pub unavailable: Arc<Mutex<bool>>,

    /// Configure the sink to refuse events
    pub reject: Arc<Mutex<bool>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            unavailable: Arc::new(Mutex::new(false)),
            reject: Arc::new(Mutex::new(false)),
        }
    }

    /// Events delivered so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MockSink {
    async fn deliver(&self, event: &AuditEvent) -> Result<(), SinkError> {
        if *self.unavailable.lock().unwrap() {
            return Err(SinkError::Unavailable("Mock sink offline".into()));
        }
        if *self.reject.lock().unwrap() {
            return Err(SinkError::Rejected("Mock sink refused event".into()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
