//! Thin authenticated client over the Discord REST API

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use warden_config::DiscordConfig;
use warden_host_api::{HostError, HostResult};

const USER_AGENT: &str = concat!("DiscordBot (warden, ", env!("CARGO_PKG_VERSION"), ")");

/// Shared REST client for one guild
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: String,
    guild_id: u64,
}

impl DiscordClient {
    /// Build a client, reading the bot token from the configured environment variable
    pub fn from_config(config: &DiscordConfig, timeout: Duration) -> HostResult<Self> {
        let token = std::env::var(&config.token_env).map_err(|_| {
            HostError::Internal(format!(
                "Discord token environment variable {} is not set",
                config.token_env
            ))
        })?;

        Self::new(&config.api_base, token, config.guild_id, timeout)
    }

    pub fn new(
        api_base: &str,
        token: impl Into<String>,
        guild_id: u64,
        timeout: Duration,
    ) -> HostResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HostError::Internal(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
            guild_id,
        })
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(%method, path, "Discord request");
        self.http
            .request(method, self.url(path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    /// Send a request, mapping transport failures and non-success statuses.
    ///
    /// Statuses listed in `allowed` are returned to the caller untouched.
    pub async fn send(&self, req: RequestBuilder, allowed: &[StatusCode]) -> HostResult<Response> {
        let response = req.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if status.is_success() || allowed.contains(&status) {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| format!("{} (code {})", e.message, e.code))
            .unwrap_or(body);

        Err(match status {
            StatusCode::NOT_FOUND => HostError::NotFound,
            s if s.is_client_error() => HostError::Rejected(format!("{}: {}", s, message)),
            s => HostError::Http(format!("{}: {}", s, message)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

fn map_transport_error(e: reqwest::Error) -> HostError {
    if e.is_timeout() {
        HostError::Http(format!("request timed out: {}", e))
    } else {
        HostError::Http(e.to_string())
    }
}

/// Percent-encode an audit log reason for the `X-Audit-Log-Reason` header.
///
/// Discord caps the reason at 512 characters.
pub fn encode_audit_reason(reason: &str) -> String {
    let truncated: String = reason.chars().take(512).collect();
    let mut out = String::with_capacity(truncated.len());
    for byte in truncated.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
