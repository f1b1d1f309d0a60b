//! Best-effort audit reporting

use std::sync::Arc;
use tracing::{debug, warn};
use warden_api::AuditEvent;
use warden_host_api::{AuditSink, SinkError};

use crate::{SanctionError, SanctionResult};

/// Hands lifecycle events to the configured sink.
///
/// Callers treat every error as non-fatal: a committed state transition is
/// never rolled back because reporting failed.
#[derive(Clone)]
pub struct AuditReporter {
    sink: Arc<dyn AuditSink>,
}

impl AuditReporter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Deliver one event. An unreachable sink is `SinkUnavailable`; an
    /// event the sink refused is `AuditRejected`.
    pub async fn report(&self, event: AuditEvent) -> SanctionResult<()> {
        match self.sink.deliver(&event).await {
            Ok(()) => {
                debug!(
                    sink = self.sink.name(),
                    event = event.kind.name(),
                    subject = %event.subject,
                    "Audit event delivered"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    sink = self.sink.name(),
                    event = event.kind.name(),
                    subject = %event.subject,
                    error = %e,
                    "Audit event not delivered"
                );
                Err(match e {
                    SinkError::Unavailable(msg) => SanctionError::SinkUnavailable(msg),
                    SinkError::Rejected(msg) => SanctionError::AuditRejected(msg),
                })
            }
        }
    }
}
