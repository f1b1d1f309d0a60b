//! wardend - The warden service
//!
//! This is the main entry point for warden. It wires together:
//! - Configuration loading
//! - Store initialization
//! - Subject resolver and audit sink (Discord, or offline fallbacks)
//! - The sanction executor and its reversal scheduler
//!
//! `wardend run` keeps firing due reversals until signalled. The other
//! subcommands are one-shot operator commands against the same database.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_api::{JobState, Sanction};
use warden_config::{WardenConfig, load_config_or_default};
use warden_core::{
    AuditReporter, ImposeRequest, JobOutcome, ReverseOutcome, ReversalScheduler, SanctionExecutor,
};
use warden_host_api::{AuditSink, OfflineResolver, SubjectResolver, TracingSink};
use warden_host_discord::{DiscordClient, DiscordLogSink, DiscordResolver};
use warden_store::SqliteStore;
use warden_util::{DATABASE_FILENAME, SubjectId, default_config_path, format_duration, format_timestamp};

/// wardend - Time-bound moderation sanctions
#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(about = "Time-bound moderation sanctions with durable automatic reversal", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/warden/config.toml)
    #[arg(short, long, global = true, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set WARDEN_DATA_DIR env var)
    #[arg(short, long, global = true, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service, firing reversals as they come due (default)
    Run,

    /// Temporarily sanction a subject
    Impose {
        /// Subject to sanction
        subject: String,
        /// Duration, e.g. "3d" or "12h30m"
        duration: String,
        /// Reason shown to the subject and in the audit log
        reason: String,
        /// Operator imposing the sanction
        #[arg(long, env = "WARDEN_ACTOR")]
        actor: String,
    },

    /// Lift a subject's sanction now
    Reverse {
        subject: String,
        /// Operator lifting the sanction
        #[arg(long, env = "WARDEN_ACTOR")]
        actor: String,
    },

    /// Show a subject's open sanction and history
    Status { subject: String },

    /// List reversal jobs
    Jobs {
        /// Only show jobs that exhausted their retries
        #[arg(long)]
        exhausted: bool,
    },
}

/// Assembled collaborators
struct Service {
    executor: SanctionExecutor,
    poll_interval: std::time::Duration,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let mut config = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        if let Some(data_dir) = &args.data_dir {
            config.service.data_dir = data_dir.clone();
        }

        std::fs::create_dir_all(&config.service.data_dir).with_context(|| {
            format!("Failed to create data directory {:?}", config.service.data_dir)
        })?;

        let db_path = config.service.data_dir.join(DATABASE_FILENAME);
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        info!(path = %db_path.display(), "Store initialized");

        let (resolver, sink) = build_collaborators(&config)?;
        let reporter = AuditReporter::new(sink);
        let scheduler = ReversalScheduler::new(store.clone(), config.scheduler);
        let executor = SanctionExecutor::new(
            store,
            resolver,
            scheduler,
            reporter,
            config.executor.clone(),
        );

        Ok(Self {
            executor,
            poll_interval: config.service.poll_interval,
        })
    }

    async fn run(self) -> Result<()> {
        let report = self
            .executor
            .recover(warden_util::now())
            .context("Failed to recover reversal jobs")?;
        if report.overdue > 0 {
            info!(overdue = report.overdue, "Overdue reversals will fire now");
        }

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let mut tick_timer = tokio::time::interval(self.poll_interval);

        info!(poll_interval = ?self.poll_interval, "Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = tick_timer.tick() => {
                    for outcome in self.executor.tick(warden_util::now()).await {
                        log_outcome(&outcome);
                    }
                }
            }
        }

        info!("Service stopped");
        Ok(())
    }
}

fn build_collaborators(
    config: &WardenConfig,
) -> Result<(Arc<dyn SubjectResolver>, Arc<dyn AuditSink>)> {
    let Some(discord) = &config.discord else {
        warn!("No [discord] section; sanctions are recorded without external action");
        return Ok((Arc::new(OfflineResolver), Arc::new(TracingSink)));
    };

    let client = DiscordClient::from_config(discord, config.executor.action_timeout)
        .context("Failed to create Discord client")?;
    let resolver: Arc<dyn SubjectResolver> = Arc::new(DiscordResolver::new(client.clone(), discord));

    let sink: Arc<dyn AuditSink> = match discord.log_channel_id {
        Some(channel_id) => Arc::new(DiscordLogSink::new(client, channel_id)),
        None => {
            warn!("No log channel configured; audit events go to the service log");
            Arc::new(TracingSink)
        }
    };

    info!(guild_id = discord.guild_id, sink = sink.name(), "Discord adapter ready");
    Ok((resolver, sink))
}

fn log_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed { sanction_id, subject } => {
            info!(sanction_id = %sanction_id, subject = %subject, "Reversal job completed");
        }
        JobOutcome::Retrying { sanction_id, next_fire_at, .. } => {
            info!(sanction_id = %sanction_id, next_fire_at = %next_fire_at, "Reversal job rescheduled");
        }
        JobOutcome::Exhausted { sanction_id, subject, .. } => {
            warn!(
                sanction_id = %sanction_id,
                subject = %subject,
                "Reversal job exhausted; run `wardend jobs --exhausted` and `wardend reverse`"
            );
        }
    }
}

fn describe(sanction: &Sanction) -> String {
    format!(
        "#{} {} by {} for {} (imposed {}, expires {}): {}",
        sanction.id,
        sanction.status,
        sanction.actor,
        format_duration(sanction.offset()),
        format_timestamp(&sanction.imposed_at),
        format_timestamp(&sanction.expires_at),
        sanction.reason
    )
}

async fn run_command(service: Service, command: Command) -> Result<()> {
    if let Command::Run = command {
        return service.run().await;
    }

    let executor = &service.executor;
    let now = warden_util::now();

    match command {
        Command::Run => Ok(()),

        Command::Impose {
            subject,
            duration,
            reason,
            actor,
        } => {
            let request = ImposeRequest::new(subject, actor, duration, reason);
            match executor.impose(request, now).await {
                Ok(outcome) => {
                    println!("{}", outcome.message());
                    Ok(())
                }
                Err(e) => bail!("{} ({})", e.user_message(), e.kind()),
            }
        }

        Command::Reverse { subject, actor } => {
            let subject = SubjectId::new(subject);
            match executor.reverse_now(&subject, &SubjectId::new(actor), now).await {
                Ok(ReverseOutcome::Reversed(_)) => {
                    println!("<@{}> has been unbanned.", subject);
                    Ok(())
                }
                Ok(ReverseOutcome::NotSanctioned) => {
                    println!("<@{}> is not temp banned.", subject);
                    Ok(())
                }
                Err(e) => bail!("{} ({})", e.user_message(), e.kind()),
            }
        }

        Command::Status { subject } => {
            let subject = SubjectId::new(subject);
            let Some(known) = executor.subject(&subject)? else {
                println!("<@{}> has no sanction history.", subject);
                return Ok(());
            };
            println!("<@{}> first seen {}", subject, format_timestamp(&known.first_seen));
            match executor.status(&subject)? {
                Some(open) => println!("Open: {}", describe(&open)),
                None => println!("<@{}> is not temp banned.", subject),
            }
            for sanction in executor.history(&subject)? {
                if !sanction.status.is_open() {
                    println!("  {}", describe(&sanction));
                }
            }
            Ok(())
        }

        Command::Jobs { exhausted } => {
            let filter = exhausted.then_some(JobState::Exhausted);
            for job in executor.jobs(filter)? {
                println!(
                    "#{} {} {} fire_at={} attempts={}{}",
                    job.sanction_id,
                    job.subject,
                    job.state.as_str(),
                    format_timestamp(&job.fire_at),
                    job.attempts,
                    job.last_error
                        .map(|e| format!(" last_error={:?}", e))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");

    if warden_util::is_mock_time_active() {
        warn!(now = %warden_util::now(), "Mock time is active");
    }

    let service = Service::new(&args)?;
    run_command(service, args.command.unwrap_or(Command::Run)).await
}
