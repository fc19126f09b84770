//! Services shared by the states of every campaign.

use std::sync::Arc;

use horde_core::{Directive, DirectiveKind, IdGenerator};

use crate::campaign::RunningCampaign;
use crate::collaborators::{CampaignReportStateKeeper, FactoryDirectory};

#[derive(Clone)]
pub struct CampaignExecutionContext {
    pub factory_directory: Arc<dyn FactoryDirectory>,
    pub report_keeper: Arc<dyn CampaignReportStateKeeper>,
    pub id_generator: Arc<dyn IdGenerator>,
}

impl CampaignExecutionContext {
    pub fn new(
        factory_directory: Arc<dyn FactoryDirectory>,
        report_keeper: Arc<dyn CampaignReportStateKeeper>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            factory_directory,
            report_keeper,
            id_generator,
        }
    }

    /// Directive of the campaign on the given channel, with a fresh id.
    pub fn directive(
        &self,
        campaign: &RunningCampaign,
        channel: impl Into<String>,
        kind: DirectiveKind,
    ) -> Directive {
        Directive::new(self.id_generator.short(), campaign.key.clone(), channel, kind)
    }

    /// Directive of the campaign sent to every factory.
    pub fn broadcast(&self, campaign: &RunningCampaign, kind: DirectiveKind) -> Directive {
        self.directive(campaign, campaign.broadcast_channel.clone(), kind)
    }
}
