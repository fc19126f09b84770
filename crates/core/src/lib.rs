//! Core types shared by the horde head and factories.
//!
//! - **Messages**: directives (head to factories) and feedbacks (factories to head)
//! - **Channels**: named pub/sub channels carrying those messages
//! - **Domain types**: campaign, scenario and assignment descriptions
//! - **Errors**: the shared error and result types

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod channel;
pub mod directive;
pub mod error;
pub mod feedback;
pub mod ids;
pub mod result;
pub mod types;

pub use channel::{ChannelHub, ChannelSubscription};
pub use directive::{Directive, DirectiveId, DirectiveKind};
pub use error::Error;
pub use feedback::{Feedback, FeedbackKind, FeedbackStatus};
pub use ids::{IdGenerator, UlidIdGenerator};
pub use result::Result;
pub use types::{
    CampaignCompletionState, CampaignKey, ChannelName, DagId, ExecutionProfile, ExecutionStatus,
    FactoryConfiguration, FactoryScenarioAssignment, MinionId, MinionsStartingLine, NodeId,
    ScenarioConfiguration, ScenarioName, Tenant,
};
