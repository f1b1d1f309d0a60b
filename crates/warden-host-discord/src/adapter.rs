//! Guild member resolution and ban actions

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use warden_config::DiscordConfig;
use warden_host_api::{HostError, HostResult, ResolvedSubject, SubjectResolver};
use warden_util::SubjectId;

use crate::client::{DiscordClient, encode_audit_reason};

#[derive(Debug, Deserialize)]
struct GuildMember {
    user: Option<User>,
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
    global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

impl GuildMember {
    fn into_subject(self, id: &SubjectId) -> ResolvedSubject {
        let display_name = self
            .nick
            .or_else(|| self.user.as_ref().and_then(|u| u.global_name.clone()))
            .or_else(|| self.user.as_ref().map(|u| u.username.clone()));
        let id = self
            .user
            .map(|u| SubjectId::new(u.id))
            .unwrap_or_else(|| id.clone());

        ResolvedSubject {
            id,
            display_name,
            capabilities: self.roles,
        }
    }
}

/// Resolves guild members and applies guild bans
pub struct DiscordResolver {
    client: DiscordClient,
    exempt_roles: Vec<String>,
}

impl DiscordResolver {
    pub fn new(client: DiscordClient, config: &DiscordConfig) -> Self {
        Self {
            client,
            exempt_roles: config
                .exempt_role_ids
                .iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }

    fn ban_path(&self, id: &SubjectId) -> String {
        format!("/guilds/{}/bans/{}", self.client.guild_id(), id)
    }
}

#[async_trait]
impl SubjectResolver for DiscordResolver {
    async fn resolve(&self, id: &SubjectId) -> HostResult<Option<ResolvedSubject>> {
        let path = format!("/guilds/{}/members/{}", self.client.guild_id(), id);
        let response = self
            .client
            .send(self.client.request(Method::GET, &path), &[StatusCode::NOT_FOUND])
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(subject = %id, "Not a guild member");
            return Ok(None);
        }

        let member: GuildMember = response
            .json()
            .await
            .map_err(|e| HostError::Http(format!("invalid member payload: {}", e)))?;

        Ok(Some(member.into_subject(id)))
    }

    fn has_exempt_capability(&self, subject: &ResolvedSubject) -> bool {
        subject
            .capabilities
            .iter()
            .any(|role| self.exempt_roles.contains(role))
    }

    async fn apply_sanction(&self, subject: &ResolvedSubject, reason: &str) -> HostResult<()> {
        let req = self
            .client
            .request(Method::PUT, &self.ban_path(&subject.id))
            .header("X-Audit-Log-Reason", encode_audit_reason(reason))
            .json(&json!({}));
        self.client.send(req, &[]).await?;

        info!(subject = %subject.id, "Guild ban applied");
        Ok(())
    }

    async fn revert_sanction(&self, id: &SubjectId) -> HostResult<()> {
        // Unknown Ban means someone already lifted it by hand
        let response = self
            .client
            .send(
                self.client.request(Method::DELETE, &self.ban_path(id)),
                &[StatusCode::NOT_FOUND],
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(subject = %id, "Guild ban already lifted");
        } else {
            info!(subject = %id, "Guild ban lifted");
        }
        Ok(())
    }

    async fn notify(&self, subject: &ResolvedSubject, message: &str) -> HostResult<()> {
        let req = self
            .client
            .request(Method::POST, "/users/@me/channels")
            .json(&json!({ "recipient_id": subject.id.as_str() }));
        let channel: Channel = self
            .client
            .send(req, &[])
            .await?
            .json()
            .await
            .map_err(|e| HostError::Http(format!("invalid channel payload: {}", e)))?;

        let req = self
            .client
            .request(Method::POST, &format!("/channels/{}/messages", channel.id))
            .json(&json!({ "content": message }));
        self.client.send(req, &[]).await?;

        debug!(subject = %subject.id, "Notice delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn resolver(exempt: Vec<u64>) -> DiscordResolver {
        let config = DiscordConfig {
            guild_id: 42,
            token_env: "DISCORD_TOKEN".into(),
            api_base: "http://localhost".into(),
            exempt_role_ids: exempt,
            log_channel_id: None,
        };
        let client = DiscordClient::new(&config.api_base, "t", config.guild_id, Duration::from_secs(1))
            .unwrap();
        DiscordResolver::new(client, &config)
    }

    #[test]
    fn member_payload_prefers_nickname() {
        let member: GuildMember = serde_json::from_str(
            r#"{"user":{"id":"7","username":"alice","global_name":"Alice"},"nick":"Al","roles":["9"]}"#,
        )
        .unwrap();
        let subject = member.into_subject(&SubjectId::new("7"));

        assert_eq!(subject.display_name.as_deref(), Some("Al"));
        assert_eq!(subject.capabilities, vec!["9".to_string()]);
    }

    #[test]
    fn member_payload_without_roles() {
        let member: GuildMember =
            serde_json::from_str(r#"{"user":{"id":"7","username":"alice","global_name":null}}"#)
                .unwrap();
        let subject = member.into_subject(&SubjectId::new("7"));

        assert_eq!(subject.display_name.as_deref(), Some("alice"));
        assert!(subject.capabilities.is_empty());
    }

    #[test]
    fn exempt_roles_match_by_id() {
        let resolver = resolver(vec![100, 200]);
        let exempt = ResolvedSubject::new(SubjectId::new("1")).with_capability("200");
        let plain = ResolvedSubject::new(SubjectId::new("2")).with_capability("300");

        assert!(resolver.has_exempt_capability(&exempt));
        assert!(!resolver.has_exempt_capability(&plain));
        assert_eq!(resolver.ban_path(&SubjectId::new("2")), "/guilds/42/bans/2");
    }
}
