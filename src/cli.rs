//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Horde - distributed load-testing campaign orchestrator
#[derive(Parser, Debug)]
#[command(name = "horde")]
#[command(version)]
#[command(about = "Run load-testing campaigns with a head and competing factories")]
#[command(
    long_about = "Horde drives a campaign through factory assignment, minion assignment, ramp-up, run and shutdown. The standalone mode runs the head and its factories in one process."
)]
pub struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = "horde.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured campaign against in-process factories
    Run {
        /// Number of simulated factories
        #[arg(short, long)]
        factories: Option<usize>,

        /// Campaign key
        #[arg(short, long)]
        key: Option<String>,

        /// Abort the campaign after this many milliseconds
        #[arg(long)]
        abort_after_ms: Option<u64>,

        /// Make the abort hard
        #[arg(long, default_value_t = false, requires = "abort_after_ms")]
        hard: bool,

        /// Print the outcome and report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Validate the configuration and print it
    Config,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_run_with_abort_parses() {
        let cli = Cli::try_parse_from([
            "horde",
            "run",
            "--factories",
            "3",
            "--abort-after-ms",
            "50",
            "--hard",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                factories: Some(3),
                abort_after_ms: Some(50),
                hard: true,
                ..
            }
        ));
        assert_eq!(cli.config, PathBuf::from("horde.toml"));
    }

    #[test]
    fn test_hard_requires_an_abort_delay() {
        assert!(Cli::try_parse_from(["horde", "run", "--hard"]).is_err());
    }

    #[test]
    fn test_config_path_is_global() {
        let cli = Cli::try_parse_from(["horde", "config", "--config", "custom.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(cli.command, Commands::Config));
    }
}
