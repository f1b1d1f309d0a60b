//! Configuration validation

use crate::schema::{RawConfig, RawDiscordConfig};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("'{field}' must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("base_backoff_seconds ({base}s) exceeds max_backoff_seconds ({max}s)")]
    BackoffOrder { base: u64, max: u64 },

    #[error("notice_template cannot be empty")]
    EmptyNoticeTemplate,

    #[error("Invalid snowflake for '{field}': '{value}'")]
    InvalidSnowflake { field: &'static str, value: String },

    #[error("Invalid api_base '{0}': expected an http(s) URL")]
    InvalidApiBase(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_positive(&mut errors, "poll_interval_ms", config.service.poll_interval_ms);
    check_positive(
        &mut errors,
        "max_attempts",
        config.scheduler.max_attempts.map(u64::from),
    );
    check_positive(
        &mut errors,
        "base_backoff_seconds",
        config.scheduler.base_backoff_seconds,
    );
    check_positive(&mut errors, "lease_seconds", config.scheduler.lease_seconds);
    check_positive(
        &mut errors,
        "action_timeout_seconds",
        config.executor.action_timeout_seconds,
    );

    if let (Some(base), Some(max)) = (
        config.scheduler.base_backoff_seconds,
        config.scheduler.max_backoff_seconds,
    ) && base > max
    {
        errors.push(ValidationError::BackoffOrder { base, max });
    }

    if let Some(template) = &config.executor.notice_template
        && template.trim().is_empty()
    {
        errors.push(ValidationError::EmptyNoticeTemplate);
    }

    if let Some(discord) = &config.discord {
        errors.extend(validate_discord(discord));
    }

    errors
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: Option<u64>) {
    if value == Some(0) {
        errors.push(ValidationError::MustBePositive { field });
    }
}

fn validate_discord(discord: &RawDiscordConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !is_snowflake(&discord.guild_id) {
        errors.push(ValidationError::InvalidSnowflake {
            field: "guild_id",
            value: discord.guild_id.clone(),
        });
    }

    for role in &discord.exempt_role_ids {
        if !is_snowflake(role) {
            errors.push(ValidationError::InvalidSnowflake {
                field: "exempt_role_ids",
                value: role.clone(),
            });
        }
    }

    if let Some(channel) = &discord.log_channel_id
        && !is_snowflake(channel)
    {
        errors.push(ValidationError::InvalidSnowflake {
            field: "log_channel_id",
            value: channel.clone(),
        });
    }

    if let Some(base) = &discord.api_base
        && !(base.starts_with("https://") || base.starts_with("http://"))
    {
        errors.push(ValidationError::InvalidApiBase(base.clone()));
    }

    errors
}

/// Discord snowflakes are unsigned 64-bit integers rendered in decimal
pub fn is_snowflake(s: &str) -> bool {
    !s.is_empty() && s.parse::<u64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> RawConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&parse("config_version = 1")).is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let config = parse(
            r#"
            config_version = 1
            [scheduler]
            max_attempts = 0
            [executor]
            action_timeout_seconds = 0
            "#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::MustBePositive { .. })));
    }

    #[test]
    fn backoff_order_checked() {
        let config = parse(
            r#"
            config_version = 1
            [scheduler]
            base_backoff_seconds = 600
            max_backoff_seconds = 60
            "#,
        );

        let errors = validate_config(&config);
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::BackoffOrder { base: 600, max: 60 }]
        ));
    }

    #[test]
    fn discord_ids_must_be_snowflakes() {
        let config = parse(
            r#"
            config_version = 1
            [discord]
            guild_id = "my-guild"
            exempt_role_ids = ["1", "vegan"]
            api_base = "ftp://discord.com"
            "#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidApiBase(_))));
    }
}
