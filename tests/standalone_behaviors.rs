//! Standalone Runner Behavioral Tests - BDD Style
//!
//! Following BDD naming convention: given_<context>_when_<action>_then_<outcome>
//!
//! A head and its simulated factories run whole campaigns in-process.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]

use std::io::Write;
use std::time::Duration;

use horde::standalone::{self, AbortRequest, StandaloneRun};
use horde::{HordeConfig, ScenarioConfig};
use horde_core::{ExecutionProfile, ExecutionStatus};
use horde_head::states::ABORTED_MESSAGE;

const RUN_DEADLINE: Duration = Duration::from_secs(10);

/// Defaults with fast minions.
fn quick_config() -> HordeConfig {
    let mut config = HordeConfig::default();
    config.campaign.minion_duration_ms = 1;
    config
}

/// Minions running long enough for the campaign to be stopped first.
fn endless_config() -> HordeConfig {
    let mut config = HordeConfig::default();
    config.campaign.minion_duration_ms = 60_000;
    config
}

async fn run(config: &HordeConfig, abort: Option<AbortRequest>) -> StandaloneRun {
    tokio::time::timeout(RUN_DEADLINE, standalone::run(config, abort))
        .await
        .expect("campaign did not end in time")
        .expect("campaign run failed")
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPLETE RUNS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_default_campaign_when_run_then_it_succeeds_and_every_scenario_completes() {
    // Given
    let config = quick_config();

    // When
    let run = run(&config, None).await;

    // Then
    assert!(run.outcome.successful, "outcome: {:?}", run.outcome);
    assert_eq!(run.outcome.key, "campaign-1");
    let report = run.report.expect("report should exist");
    assert_eq!(report.status, ExecutionStatus::Successful);
    assert_eq!(report.scenarios.len(), 2);
    assert!(
        report
            .scenarios
            .values()
            .all(|status| *status == ExecutionStatus::Successful),
        "scenarios: {:?}",
        report.scenarios
    );
}

#[tokio::test]
async fn given_no_ramp_up_schedule_when_run_then_minions_start_at_once_and_it_succeeds() {
    // Given
    let mut config = quick_config();
    config.campaign.schedule_ramp_up = false;
    config.campaign.factories = 3;

    // When
    let run = run(&config, None).await;

    // Then
    assert!(run.outcome.successful, "outcome: {:?}", run.outcome);
}

#[tokio::test]
async fn given_single_factory_when_run_then_it_takes_every_minion_and_succeeds() {
    // Given
    let mut config = quick_config();
    config.campaign.factories = 1;
    config.campaign.key = "solo".to_string();

    // When
    let run = run(&config, None).await;

    // Then
    assert!(run.outcome.successful);
    assert_eq!(run.outcome.key, "solo");
}

#[tokio::test]
async fn given_slow_speed_factor_when_run_then_it_still_completes() {
    // Given
    let mut config = quick_config();
    config.campaign.speed_factor = 0.5;
    config.campaign.start_offset_ms = 5;

    // When
    let run = run(&config, None).await;

    // Then
    assert!(run.outcome.successful);
}

// ═══════════════════════════════════════════════════════════════════════════
// ABORTS AND TIMEOUTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_running_minions_when_hard_abort_then_campaign_fails_as_aborted() {
    // Given
    let config = endless_config();

    // When
    let run = run(&config, Some(AbortRequest::new(Duration::from_millis(200), true))).await;

    // Then
    assert!(!run.outcome.successful);
    assert_eq!(run.outcome.message.as_deref(), Some(ABORTED_MESSAGE));
    let report = run.report.expect("report should exist");
    assert!(report.aborted);
    assert_eq!(report.status, ExecutionStatus::Aborted);
}

#[tokio::test]
async fn given_running_minions_when_soft_abort_then_campaign_completes_successfully() {
    // Given
    let config = endless_config();

    // When
    let run = run(&config, Some(AbortRequest::new(Duration::from_millis(200), false))).await;

    // Then
    assert!(run.outcome.successful, "outcome: {:?}", run.outcome);
}

#[tokio::test]
async fn given_abort_before_any_factory_answers_when_run_then_campaign_still_ends() {
    // Given
    let config = endless_config();

    // When
    let run = run(&config, Some(AbortRequest::new(Duration::ZERO, true))).await;

    // Then
    assert!(!run.outcome.successful);
}

#[tokio::test]
async fn given_hard_timeout_shorter_than_minions_when_run_then_campaign_fails() {
    // Given
    let mut config = endless_config();
    config.campaign.hard_timeout_ms = Some(200);

    // When
    let run = run(&config, None).await;

    // Then
    assert!(!run.outcome.successful);
    assert_eq!(run.outcome.message.as_deref(), Some(ABORTED_MESSAGE));
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION FILES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_config_file_when_loaded_and_run_then_its_campaign_runs() {
    // Given
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[log]
level = "debug"

[campaign]
key = "from-file"
factories = 2
minion_duration_ms = 1

[[campaign.scenarios]]
name = "browse"
minions = 6
dags = ["home", "product"]

[campaign.scenarios.execution_profile]
kind = "regular"
parameters = {{ period_ms = 5, minions_per_period = 2 }}
"#
    )
    .unwrap();

    // When
    let config = HordeConfig::load(Some(file.path())).unwrap();
    let run = run(&config, None).await;

    // Then
    assert_eq!(config.log.level, "debug");
    assert_eq!(
        config.campaign.scenarios,
        vec![ScenarioConfig {
            name: "browse".to_string(),
            minions: 6,
            dags: vec!["home".to_string(), "product".to_string()],
            execution_profile: ExecutionProfile::new(
                "regular",
                serde_json::json!({ "period_ms": 5, "minions_per_period": 2 }),
            ),
        }]
    );
    assert!(run.outcome.successful);
    assert_eq!(run.outcome.key, "from-file");
}

#[tokio::test]
async fn given_config_file_without_factories_when_loaded_then_it_is_rejected() {
    // Given
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[campaign]\nfactories = 0\n").unwrap();

    // When
    let result = HordeConfig::load(Some(file.path()));

    // Then
    assert!(matches!(result, Err(horde_core::Error::InvalidConfiguration { .. })));
}

#[tokio::test]
async fn given_malformed_config_file_when_loaded_then_parse_error_is_returned() {
    // Given
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[campaign\nkey = ").unwrap();

    // When
    let result = HordeConfig::load(Some(file.path()));

    // Then
    assert!(matches!(result, Err(horde_core::Error::TomlParseFailed { .. })));
}
