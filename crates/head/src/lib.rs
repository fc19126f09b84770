//! Head of a horde: drives campaigns through their lifecycle.
//!
//! - **States**: the campaign lifecycle state machine
//! - **Actors**: one sequential consumer per campaign
//! - **Orchestrator**: starts, feeds and aborts campaigns
//! - **Collaborators**: factory directory and report keeper seams

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod actors;
pub mod campaign;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod errors;
pub mod orchestrator;
pub mod states;

pub use actors::{CampaignOutcome, CampaignSnapshot};
pub use campaign::RunningCampaign;
pub use collaborators::{
    CampaignReport, CampaignReportStateKeeper, FactoryDirectory, HeartbeatState,
    InMemoryCampaignReportStateKeeper, InMemoryFactoryDirectory, ReportSeverity,
};
pub use config::HeadConfig;
pub use context::CampaignExecutionContext;
pub use errors::HeadError;
pub use orchestrator::CampaignOrchestrator;
pub use states::{AbortConfiguration, CampaignState, Phase};
