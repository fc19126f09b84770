//! Execution Completion Behavioral Tests - BDD Style
//!
//! Following BDD naming convention: given_<context>_when_<action>_then_<outcome>

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]

mod common;

use std::sync::Arc;

use horde_core::{CampaignCompletionState, FactoryScenarioAssignment};
use horde_factory::{AssignmentMode, KeyLayout, MinionAssignmentKeeper};

use common::{CAMPAIGN, TENANT, ids, keeper, shared_store, strings};

async fn complete(
    keeper: &MinionAssignmentKeeper,
    scenario: &str,
    minion: &str,
    dags: &[&str],
) -> CampaignCompletionState {
    keeper
        .execution_complete(CAMPAIGN, scenario, minion, &strings(dags), false)
        .await
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLL-UP
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_two_scenarios_when_all_dags_complete_then_campaign_completes_and_is_purged() {
    // Given: checkout with 2 minions of 2 DAGs, browse with 1 minion of 1 DAG
    let store = shared_store();
    let keeper = keeper(&store, "factory-1", AssignmentMode::SingleLocation);
    keeper
        .assign_factory_dags(
            CAMPAIGN,
            &[
                FactoryScenarioAssignment::new("checkout", strings(&["d1", "d2"])),
                FactoryScenarioAssignment::new("browse", strings(&["b1"])),
            ],
        )
        .await
        .unwrap();
    keeper
        .register_minions_to_assign(CAMPAIGN, "checkout", &strings(&["d1", "d2"]), &ids("m", 2), true)
        .await
        .unwrap();
    keeper
        .register_minions_to_assign(CAMPAIGN, "browse", &strings(&["b1"]), &ids("b", 1), true)
        .await
        .unwrap();
    keeper.assign(CAMPAIGN, "checkout").await.unwrap();
    keeper.assign(CAMPAIGN, "browse").await.unwrap();

    // When: DAGs complete one after the other
    let partial = complete(&keeper, "checkout", "m1", &["d1"]).await;
    let first_minion = complete(&keeper, "checkout", "m1", &["d2"]).await;
    let first_scenario = complete(&keeper, "checkout", "m2", &["d1", "d2"]).await;
    assert!(keeper.local_store().has_minions_assigned("browse").await);
    let campaign = complete(&keeper, "browse", "b1", &["b1"]).await;

    // Then: Completion rolls up from minion to scenario to campaign
    assert_eq!(partial, CampaignCompletionState::default());
    assert!(first_minion.minion_complete && !first_minion.scenario_complete);
    assert!(first_scenario.scenario_complete && !first_scenario.campaign_complete);
    assert!(campaign.minion_complete && campaign.scenario_complete && campaign.campaign_complete);

    // And: The campaign keys are gone and the local assignments reset
    let layout = KeyLayout::new(TENANT, CAMPAIGN);
    assert!(store.keys_with_prefix(layout.campaign_prefix()).await.is_empty());
    assert!(!keeper.local_store().has_minions_assigned("checkout").await);
    assert!(!keeper.local_store().has_minions_assigned("browse").await);
}

#[tokio::test]
async fn given_purged_campaign_when_completing_again_then_nothing_happens() {
    // Given: A campaign with one minion, fully completed
    let store = shared_store();
    let keeper = keeper(&store, "factory-1", AssignmentMode::SingleLocation);
    keeper
        .register_minions_to_assign(CAMPAIGN, "checkout", &strings(&["d1"]), &ids("m", 1), true)
        .await
        .unwrap();
    assert!(complete(&keeper, "checkout", "m1", &["d1"]).await.campaign_complete);

    // When: The same completion is delivered again
    let replay = complete(&keeper, "checkout", "m1", &["d1"]).await;

    // Then: It is a no-op
    assert_eq!(replay, CampaignCompletionState::default());
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESTART & SINGLETONS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_restartable_minion_when_completing_then_counter_is_reset() {
    // Given: One under-load minion with 2 DAGs
    let store = shared_store();
    let keeper = keeper(&store, "factory-1", AssignmentMode::SingleLocation);
    keeper
        .register_minions_to_assign(CAMPAIGN, "checkout", &strings(&["d1", "d2"]), &ids("m", 1), true)
        .await
        .unwrap();

    // When: Its DAGs complete with a possible restart
    let restarted = keeper
        .execution_complete(CAMPAIGN, "checkout", "m1", &strings(&["d1", "d2"]), true)
        .await
        .unwrap();

    // Then: The minion iteration is complete but the scenario is not
    assert!(restarted.minion_complete);
    assert!(!restarted.scenario_complete);

    // And: A full final iteration is needed to complete the scenario
    let half = complete(&keeper, "checkout", "m1", &["d1"]).await;
    let last = complete(&keeper, "checkout", "m1", &["d2"]).await;
    assert!(!half.minion_complete);
    assert!(last.scenario_complete && last.campaign_complete);
}

#[tokio::test]
async fn given_singleton_minion_when_completing_then_only_minion_completes() {
    // Given: An under-load minion and a singleton minion for browse
    let store = shared_store();
    let keeper = keeper(&store, "factory-1", AssignmentMode::SingleLocation);
    keeper
        .register_minions_to_assign(CAMPAIGN, "browse", &strings(&["b1"]), &ids("b", 1), true)
        .await
        .unwrap();
    keeper
        .register_minions_to_assign(CAMPAIGN, "browse", &strings(&["setup"]), &ids("s", 1), false)
        .await
        .unwrap();

    // When: The singleton completes
    let singleton = complete(&keeper, "browse", "s1", &["setup"]).await;

    // Then: The scenario still waits for its under-load minion
    assert!(singleton.minion_complete);
    assert!(!singleton.scenario_complete);
    let under_load = complete(&keeper, "browse", "b1", &["b1"]).await;
    assert!(under_load.scenario_complete && under_load.campaign_complete);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_concurrent_completions_when_rolling_up_then_exactly_one_campaign_completion() {
    // Given: 20 minions spread over two factories sharing the store
    let store = shared_store();
    let keepers = [
        Arc::new(keeper(&store, "factory-1", AssignmentMode::SingleLocation)),
        Arc::new(keeper(&store, "factory-2", AssignmentMode::SingleLocation)),
    ];
    let minions = ids("m", 20);
    keepers[0]
        .register_minions_to_assign(CAMPAIGN, "checkout", &strings(&["d1"]), &minions, true)
        .await
        .unwrap();

    // When: Every minion completes at the same time, from either factory
    let handles: Vec<_> = minions
        .iter()
        .enumerate()
        .map(|(index, minion)| {
            let keeper = Arc::clone(&keepers[index % 2]);
            let minion = minion.clone();
            tokio::spawn(async move {
                keeper
                    .execution_complete(CAMPAIGN, "checkout", &minion, &strings(&["d1"]), false)
                    .await
                    .unwrap()
            })
        })
        .collect();
    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.await.unwrap());
    }

    // Then: Each minion completes, the scenario and the campaign exactly once
    assert!(states.iter().all(|state| state.minion_complete));
    assert_eq!(states.iter().filter(|s| s.scenario_complete).count(), 1);
    assert_eq!(states.iter().filter(|s| s.campaign_complete).count(), 1);
}
