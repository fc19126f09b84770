//! Factory-side error types.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Errors of the minion assignment keeper.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeeperError {
    /// The assignment loop did not converge before its deadline.
    #[error("assignment of scenario '{scenario}' in campaign '{campaign}' timed out after {timeout:?}")]
    AssignmentTimeout {
        campaign: String,
        scenario: String,
        timeout: Duration,
    },

    /// The scenario is not known by the factory.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// The scenario has no root DAG.
    #[error("scenario '{0}' has no root DAG")]
    MissingRootDag(String),

    /// The starting lines do not cover all the minions.
    #[error("{0} minions of scenario '{1}' could not be scheduled")]
    UnscheduledMinions(usize, String),

    #[error("coordination store error: {0}")]
    Store(#[from] StoreError),
}

impl KeeperError {
    pub fn assignment_timeout(
        campaign: impl Into<String>,
        scenario: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self::AssignmentTimeout {
            campaign: campaign.into(),
            scenario: scenario.into(),
            timeout,
        }
    }

    pub fn unknown_scenario(scenario: impl Into<String>) -> Self {
        Self::UnknownScenario(scenario.into())
    }

    /// Whether the error must fail the start of the campaign.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Store(StoreError::UnknownPrimitive(_)))
    }
}

/// Errors of a teardown batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TeardownError {
    /// The batch as a whole exceeded its deadline.
    #[error("teardown of {pending} items exceeded {timeout:?}")]
    BatchTimeout { pending: usize, timeout: Duration },
}
