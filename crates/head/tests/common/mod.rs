//! Shared fixtures for the head behavioural tests.

#![allow(dead_code)]

use std::sync::Arc;

use horde_core::{
    Directive, DirectiveKind, ExecutionProfile, FactoryConfiguration, FactoryScenarioAssignment,
    Feedback, FeedbackKind, FeedbackStatus, ScenarioConfiguration, UlidIdGenerator,
};
use horde_head::{
    CampaignExecutionContext, CampaignState, InMemoryCampaignReportStateKeeper,
    InMemoryFactoryDirectory, RunningCampaign,
};

pub const CAMPAIGN: &str = "campaign-1";
pub const BROADCAST: &str = "directives-broadcast";

pub struct Fixture {
    pub ctx: CampaignExecutionContext,
    pub directory: Arc<InMemoryFactoryDirectory>,
    pub reports: Arc<InMemoryCampaignReportStateKeeper>,
}

/// Context where node-1 and node-2 are idle.
pub fn fixture() -> Fixture {
    fixture_with(InMemoryFactoryDirectory::with_idle_nodes(["node-1", "node-2"]))
}

pub fn fixture_with(directory: InMemoryFactoryDirectory) -> Fixture {
    let directory = Arc::new(directory);
    let reports = Arc::new(InMemoryCampaignReportStateKeeper::new());
    let ctx = CampaignExecutionContext::new(
        directory.clone(),
        reports.clone(),
        Arc::new(UlidIdGenerator),
    );
    Fixture {
        ctx,
        directory,
        reports,
    }
}

pub fn unicast(node: &str) -> String {
    format!("unicast-{node}")
}

fn factory(node: &str, scenarios: &[&str]) -> FactoryConfiguration {
    scenarios
        .iter()
        .fold(FactoryConfiguration::new(unicast(node)), |factory, scenario| {
            factory.with_assignment(FactoryScenarioAssignment::new(
                *scenario,
                vec![format!("{scenario}-root"), format!("{scenario}-dag")],
            ))
        })
}

/// node-1 runs s1 and s2, node-2 runs s1 only.
pub fn campaign_keyed(key: &str) -> RunningCampaign {
    RunningCampaign::new(key, "acme")
        .with_scenario("s1", ScenarioConfiguration::new(10, ExecutionProfile::default()))
        .with_scenario("s2", ScenarioConfiguration::new(5, ExecutionProfile::default()))
        .with_factory("node-1", factory("node-1", &["s1", "s2"]))
        .with_factory("node-2", factory("node-2", &["s1"]))
}

pub fn campaign() -> RunningCampaign {
    campaign_keyed(CAMPAIGN)
}

/// Single factory node-1 running s1.
pub fn single_factory_campaign() -> RunningCampaign {
    RunningCampaign::new(CAMPAIGN, "acme")
        .with_scenario("s1", ScenarioConfiguration::new(3, ExecutionProfile::default()))
        .with_factory("node-1", factory("node-1", &["s1"]))
}

/// Initialize a state, and every state it settles into, the way the
/// campaign actor does.
pub async fn enter(
    mut state: CampaignState,
    ctx: &CampaignExecutionContext,
) -> (CampaignState, Vec<Directive>) {
    let mut directives = Vec::new();
    while !state.is_initialized() {
        directives.extend(state.init(ctx).await);
        state = state.settle(ctx).await;
    }
    (state, directives)
}

pub fn completed(node: &str, kind: FeedbackKind) -> Feedback {
    Feedback::completed(CAMPAIGN, node, kind)
}

pub fn ignored(node: &str, kind: FeedbackKind) -> Feedback {
    Feedback::new(CAMPAIGN, node, kind, FeedbackStatus::Ignored)
}

pub fn scenario_kinds(directives: &[Directive]) -> Vec<(String, Option<String>)> {
    let mut kinds: Vec<(String, Option<String>)> = directives
        .iter()
        .map(|d| (d.name().to_string(), d.scenario().map(ToString::to_string)))
        .collect();
    kinds.sort();
    kinds
}

pub fn only_directive(directives: &[Directive]) -> &DirectiveKind {
    assert_eq!(directives.len(), 1, "expected one directive, got {directives:?}");
    &directives[0].kind
}
