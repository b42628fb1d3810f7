//! Operator CLI for the resilience layer.
//!
//! Works against the JSON-file store named in the config, so breaker and
//! dedup state written by local workers can be inspected and repaired.
//!
//! ```text
//! worker-resilience [--config resilience.toml] <command>
//!     breaker-status <service>
//!     breaker-reset <service>
//!     inspect <event-id>
//!     cleanup --max-age-days N
//!     sign --secret S --payload-file F [--timestamp T]
//!     verify --secret S --payload-file F --header H
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::Instrument;

use worker_resilience::clock::{Clock, SystemClock};
use worker_resilience::config::{load_config, ResilienceConfig};
use worker_resilience::dedup::{stripe_signature_header, DeduplicationLock};
use worker_resilience::observability::logging::init_logging;
use worker_resilience::{CircuitBreaker, FileStore, RequestContext};

#[derive(Parser)]
#[command(name = "worker-resilience")]
#[command(about = "Inspect and maintain circuit breaker and deduplication state", long_about = None)]
struct Cli {
    /// TOML config file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the persisted breaker record for a service
    BreakerStatus { service: String },
    /// Force a service's breaker back to CLOSED
    BreakerReset { service: String },
    /// Print the deduplication record for an event
    Inspect { event_id: String },
    /// Delete old deduplication records and purge expired items
    Cleanup {
        #[arg(long, default_value_t = 30)]
        max_age_days: u32,
    },
    /// Print a webhook signature header for a payload
    Sign {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        payload_file: PathBuf,
        /// Unix seconds; now when omitted
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Check a webhook signature header; exit status reflects validity
    Verify {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        payload_file: PathBuf,
        #[arg(long)]
        header: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };
    init_logging(&config.observability)?;

    let ctx = RequestContext::new();
    let span = ctx.span(cli.command.name());
    run(cli.command, config).instrument(span).await
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::BreakerStatus { .. } => "breaker-status",
            Commands::BreakerReset { .. } => "breaker-reset",
            Commands::Inspect { .. } => "inspect",
            Commands::Cleanup { .. } => "cleanup",
            Commands::Sign { .. } => "sign",
            Commands::Verify { .. } => "verify",
        }
    }
}

async fn run(
    command: Commands,
    config: ResilienceConfig,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::BreakerStatus { service } => {
            let store = open_store(&config)?;
            let breaker = CircuitBreaker::new(service, config.circuit_breaker, store);
            match breaker.record().await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("no breaker record for '{}'", breaker.service_name()),
            }
        }
        Commands::BreakerReset { service } => {
            let store = open_store(&config)?;
            let breaker = CircuitBreaker::new(service, config.circuit_breaker, store);
            breaker.reset().await?;
            println!("breaker '{}' reset to CLOSED", breaker.service_name());
        }
        Commands::Inspect { event_id } => {
            let store = open_store(&config)?;
            let lock = DeduplicationLock::new(config.dedup, store);
            match lock.get_webhook_record(&event_id).await {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("no deduplication record for '{event_id}'"),
            }
        }
        Commands::Cleanup { max_age_days } => {
            let store = open_store(&config)?;
            let lock = DeduplicationLock::new(config.dedup, Arc::clone(&store));
            let deleted = lock.cleanup_old_records(max_age_days).await;
            let expired = store.purge_expired().await?;
            tracing::info!(deleted, expired, max_age_days, "Cleanup finished");
            println!("deleted {deleted} old records, purged {expired} expired items");
        }
        Commands::Sign {
            secret,
            payload_file,
            timestamp,
        } => {
            let payload = read_payload(&payload_file)?;
            let timestamp = timestamp.unwrap_or_else(|| SystemClock.now_secs());
            println!("{}", stripe_signature_header(&payload, &secret, timestamp));
        }
        Commands::Verify {
            secret,
            payload_file,
            header,
        } => {
            let payload = read_payload(&payload_file)?;
            let store = open_store(&config)?;
            let lock = DeduplicationLock::new(config.dedup, store);
            if lock.validate_signature(&payload, &header, &secret) {
                println!("valid");
            } else {
                println!("invalid");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn open_store(config: &ResilienceConfig) -> Result<Arc<FileStore>, Box<dyn std::error::Error>> {
    let store = FileStore::open(&config.store.path)?;
    tracing::debug!(path = %store.path().display(), "Opened state store");
    Ok(Arc::new(store))
}

fn read_payload(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}
