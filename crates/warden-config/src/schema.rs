//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Reversal scheduler settings
    #[serde(default)]
    pub scheduler: RawSchedulerConfig,

    /// Sanction workflow settings
    #[serde(default)]
    pub executor: RawExecutorConfig,

    /// Discord adapter settings; absent means no external adapter
    #[serde(default)]
    pub discord: Option<RawDiscordConfig>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// How often the scheduler looks for due jobs, in milliseconds
    pub poll_interval_ms: Option<u64>,
}

/// Reversal scheduler settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedulerConfig {
    /// Attempts before a job is marked exhausted
    pub max_attempts: Option<u32>,

    /// First retry delay; doubles per attempt
    pub base_backoff_seconds: Option<u64>,

    /// Ceiling for the retry delay
    pub max_backoff_seconds: Option<u64>,

    /// How long a claimed job is hidden from other ticks
    pub lease_seconds: Option<u64>,
}

/// Sanction workflow settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawExecutorConfig {
    /// Bound on each external action call
    pub action_timeout_seconds: Option<u64>,

    /// Notice sent to the subject before the sanction is applied.
    /// `{duration}` and `{reason}` are substituted.
    pub notice_template: Option<String>,

    /// Extra line appended to the notice (e.g. an appeal link)
    pub notice_footer: Option<String>,
}

/// Discord adapter settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawDiscordConfig {
    /// Guild the sanctions apply to
    pub guild_id: String,

    /// Environment variable holding the bot token
    pub token_env: Option<String>,

    /// REST API base URL
    pub api_base: Option<String>,

    /// Roles that make a member exempt from sanctions
    #[serde(default)]
    pub exempt_role_ids: Vec<String>,

    /// Channel receiving audit log messages
    pub log_channel_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            data_dir = "/var/lib/warden"
            poll_interval_ms = 500

            [scheduler]
            max_attempts = 3
            base_backoff_seconds = 10

            [executor]
            action_timeout_seconds = 5
            notice_footer = "Appeal at https://example.org/appeal"

            [discord]
            guild_id = "123456789"
            exempt_role_ids = ["42"]
            log_channel_id = "987654321"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.max_attempts, Some(3));
        let discord = config.discord.unwrap();
        assert_eq!(discord.guild_id, "123456789");
        assert_eq!(discord.exempt_role_ids, vec!["42".to_string()]);
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.discord.is_none());
        assert!(config.scheduler.max_attempts.is_none());
    }
}
