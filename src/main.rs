//! # Horde - standalone entry point
//!
//! Loads the configuration, then either prints it or runs the configured
//! campaign against in-process factories. The exit code is 0 only when the
//! campaign ends successfully.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use horde::cli::{Cli, Commands};
use horde::standalone::{self, AbortRequest};
use horde::HordeConfig;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = HordeConfig::load(Some(cli.config.as_path()))
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    init_tracing(&config.log.level);

    match cli.command {
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            factories,
            key,
            abort_after_ms,
            hard,
            json,
        } => {
            if let Some(factories) = factories {
                config.campaign.factories = factories;
            }
            if let Some(key) = key {
                config.campaign.key = key;
            }
            let abort = abort_after_ms.map(|ms| AbortRequest::new(Duration::from_millis(ms), hard));

            let start_time = Instant::now();
            info!(campaign = %config.campaign.key, factories = config.campaign.factories, "Horde starting");
            let run = standalone::run(&config, abort).await?;
            info!(elapsed = ?start_time.elapsed(), "Horde stopped");

            if json {
                println!("{}", serde_json::to_string_pretty(&run).context("Failed to render outcome")?);
            } else {
                let status = if run.outcome.successful { "successful" } else { "failed" };
                match &run.outcome.message {
                    Some(message) => println!("campaign {} {status}: {message}", run.outcome.key),
                    None => println!("campaign {} {status}", run.outcome.key),
                }
            }
            Ok(if run.outcome.successful {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Initialize tracing subscriber, `RUST_LOG` winning over the configured level.
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
