//! Actors of the head.
//!
//! One `CampaignActorDef` runs per campaign: it dequeues the campaign's
//! feedbacks one at a time, feeds them to the current state and publishes
//! the directives of every phase it enters. Campaigns share no state.

pub mod campaign;
pub mod messages;

pub use campaign::{CampaignActorArguments, CampaignActorDef, CampaignActorState};
pub use messages::{AbortSlot, CampaignMessage, CampaignOutcome, CampaignSnapshot};
