//! Validated settings structures

use crate::schema::{
    RawConfig, RawDiscordConfig, RawExecutorConfig, RawSchedulerConfig, RawServiceConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use warden_util::default_data_dir;

/// Default notice sent to a subject before the sanction is applied
pub const DEFAULT_NOTICE_TEMPLATE: &str =
    "You have been temporarily banned for {duration}. Reason: {reason}";

/// Default Discord REST API base
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Validated configuration ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct WardenConfig {
    pub service: ServiceConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub discord: Option<DiscordConfig>,
}

impl WardenConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            scheduler: SchedulerConfig::from_raw(raw.scheduler),
            executor: ExecutorConfig::from_raw(raw.executor),
            discord: raw.discord.map(DiscordConfig::from_raw),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            poll_interval: Duration::from_millis(raw.poll_interval_ms.unwrap_or(1000)),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Retry and lease policy for reversal jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub lease: Duration,
}

impl SchedulerConfig {
    fn from_raw(raw: RawSchedulerConfig) -> Self {
        Self {
            max_attempts: raw.max_attempts.unwrap_or(5),
            base_backoff: Duration::from_secs(raw.base_backoff_seconds.unwrap_or(30)),
            max_backoff: Duration::from_secs(raw.max_backoff_seconds.unwrap_or(3600)),
            lease: Duration::from_secs(raw.lease_seconds.unwrap_or(300)),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_raw(RawSchedulerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub action_timeout: Duration,
    pub notice_template: String,
    pub notice_footer: Option<String>,
}

impl ExecutorConfig {
    fn from_raw(raw: RawExecutorConfig) -> Self {
        Self {
            action_timeout: Duration::from_secs(raw.action_timeout_seconds.unwrap_or(10)),
            notice_template: raw
                .notice_template
                .unwrap_or_else(|| DEFAULT_NOTICE_TEMPLATE.to_string()),
            notice_footer: raw.notice_footer,
        }
    }

    /// Render the pre-sanction notice
    pub fn render_notice(&self, duration: &str, reason: &str) -> String {
        let body = self
            .notice_template
            .replace("{duration}", duration)
            .replace("{reason}", reason);

        match &self.notice_footer {
            Some(footer) => format!("{}\n\n{}", body, footer),
            None => body,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_raw(RawExecutorConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordConfig {
    pub guild_id: u64,
    pub token_env: String,
    pub api_base: String,
    pub exempt_role_ids: Vec<u64>,
    pub log_channel_id: Option<u64>,
}

impl DiscordConfig {
    // Snowflakes were checked by validation; anything unparsable is dropped.
    fn from_raw(raw: RawDiscordConfig) -> Self {
        Self {
            guild_id: raw.guild_id.parse().unwrap_or_default(),
            token_env: raw.token_env.unwrap_or_else(|| "DISCORD_TOKEN".to_string()),
            api_base: raw
                .api_base
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            exempt_role_ids: raw
                .exempt_role_ids
                .iter()
                .filter_map(|id| id.parse().ok())
                .collect(),
            log_channel_id: raw.log_channel_id.and_then(|id| id.parse().ok()),
        }
    }
}
