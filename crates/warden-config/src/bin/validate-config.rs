//! Config validation CLI tool
//!
//! Validates a warden configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use warden_util::{default_config_path, format_duration};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a warden configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match warden_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", warden_config::CURRENT_CONFIG_VERSION);
            println!("  Data dir: {}", config.service.data_dir.display());
            println!(
                "  Reversal retries: {} (backoff {} .. {})",
                config.scheduler.max_attempts,
                format_duration(config.scheduler.base_backoff),
                format_duration(config.scheduler.max_backoff)
            );
            println!(
                "  Action timeout: {}",
                format_duration(config.executor.action_timeout)
            );

            match &config.discord {
                Some(discord) => {
                    println!("  Discord guild: {}", discord.guild_id);
                    println!("  Exempt roles: {}", discord.exempt_role_ids.len());
                    match discord.log_channel_id {
                        Some(channel) => println!("  Audit channel: {}", channel),
                        None => println!("  Audit channel: none (tracing only)"),
                    }
                }
                None => println!("  Discord adapter: not configured"),
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                warden_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                warden_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                warden_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                warden_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        warden_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
