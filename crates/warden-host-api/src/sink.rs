//! Audit sink that writes to the tracing pipeline

use async_trait::async_trait;
use tracing::info;
use warden_api::AuditEvent;

use crate::{AuditSink, SinkError};

/// Writes audit events as structured `tracing` records under `warden::audit`.
///
/// Never unavailable; used when no external sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn deliver(&self, event: &AuditEvent) -> Result<(), SinkError> {
        let kind = serde_json::to_string(&event.kind)
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        let duration = event.duration_text();

        info!(
            target: "warden::audit",
            event_id = %event.id,
            event = event.kind.name(),
            success = event.kind.is_success(),
            subject = %event.subject,
            actor = event.actor.as_ref().map(|a| a.as_str()),
            reason = event.reason.as_deref(),
            duration = duration.as_deref(),
            timestamp = %event.timestamp,
            detail = %kind,
            "audit"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
