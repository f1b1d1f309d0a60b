//! Log channel audit sink

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use warden_api::{AuditEvent, AuditEventKind};
use warden_host_api::{AuditSink, HostError, SinkError};

use crate::client::DiscordClient;

const COLOR_IMPOSED: u32 = 0xFF0000;
const COLOR_REVERSED: u32 = 0x00B050;
const COLOR_FAILED: u32 = 0xFFA500;

/// Posts audit events as embeds in a guild text channel
pub struct DiscordLogSink {
    client: DiscordClient,
    channel_id: u64,
}

impl DiscordLogSink {
    pub fn new(client: DiscordClient, channel_id: u64) -> Self {
        Self { client, channel_id }
    }
}

/// Build the embed payload for an audit event
pub fn embed_for(event: &AuditEvent) -> Value {
    let (title, color) = match &event.kind {
        AuditEventKind::SanctionImposed { .. } => ("Temp Ban", COLOR_IMPOSED),
        AuditEventKind::SanctionReversed { manual: true, .. } => ("Unban", COLOR_REVERSED),
        AuditEventKind::SanctionReversed { manual: false, .. } => ("Temp Ban Expired", COLOR_REVERSED),
        AuditEventKind::ReversalAttemptFailed { .. } => ("Unban Attempt Failed", COLOR_FAILED),
        AuditEventKind::ReversalFailed { .. } => ("Unban Failed", COLOR_FAILED),
    };

    let mut fields = vec![json!({
        "name": "User",
        "value": format!("<@{}>", event.subject),
        "inline": true,
    })];
    if let Some(actor) = &event.actor {
        fields.push(json!({ "name": "Moderator", "value": format!("<@{}>", actor), "inline": true }));
    }
    if let Some(duration) = event.duration_text() {
        fields.push(json!({ "name": "Duration", "value": duration, "inline": false }));
    }
    if let Some(reason) = &event.reason {
        fields.push(json!({ "name": "Reason", "value": reason, "inline": false }));
    }
    match &event.kind {
        AuditEventKind::ReversalAttemptFailed { attempt, error, .. } => {
            fields.push(json!({ "name": "Attempt", "value": attempt.to_string(), "inline": true }));
            fields.push(json!({ "name": "Error", "value": error, "inline": false }));
        }
        AuditEventKind::ReversalFailed { attempts, error, .. } => {
            fields.push(json!({ "name": "Attempts", "value": attempts.to_string(), "inline": true }));
            fields.push(json!({ "name": "Error", "value": error, "inline": false }));
        }
        _ => {}
    }

    json!({
        "embeds": [{
            "title": title,
            "color": color,
            "fields": fields,
            "timestamp": event.timestamp.to_rfc3339(),
            "footer": { "text": format!("ID: {}", event.subject) },
        }]
    })
}

#[async_trait]
impl AuditSink for DiscordLogSink {
    async fn deliver(&self, event: &AuditEvent) -> Result<(), SinkError> {
        let req = self
            .client
            .request(Method::POST, &format!("/channels/{}/messages", self.channel_id))
            .json(&embed_for(event));

        match self.client.send(req, &[]).await {
            Ok(_) => Ok(()),
            Err(HostError::NotFound) => Err(SinkError::Unavailable(format!(
                "log channel {} not found",
                self.channel_id
            ))),
            Err(HostError::Rejected(msg)) => Err(SinkError::Rejected(msg)),
            Err(e) => Err(SinkError::Unavailable(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "discord-log-channel"
    }
}
