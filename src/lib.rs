//! # Horde
//!
//! Distributed load-testing campaign orchestrator. A head drives each
//! campaign through its lifecycle while competing factories share the
//! minions of its scenarios.
//!
//! This package holds the `horde` binary: its command line, its TOML
//! configuration and the standalone runner hosting a head and its factories
//! in one process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod config;
pub mod standalone;

pub use config::{CampaignConfig, HordeConfig, LogConfig, ScenarioConfig};
pub use standalone::{AbortRequest, StandaloneRun};
