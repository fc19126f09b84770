//! Teardown of minions and scenarios.
//!
//! Every item is shut down by an independent operation bounded by its own
//! timeout. Failing or late items are logged and counted, never allowed to
//! block their siblings. Only the deadline of the batch as a whole is
//! reported as an error.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::TeardownConfig;
use crate::errors::TeardownError;

/// Outcome of the teardown of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeardownOutcome {
    Done,
    Failed(String),
    TimedOut,
}

/// Counts of a completed teardown batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownStats {
    pub done: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl TeardownStats {
    pub const fn total(&self) -> usize {
        self.done
            .saturating_add(self.failed)
            .saturating_add(self.timed_out)
    }
}

/// Fans out teardown operations.
#[derive(Debug, Clone)]
pub struct Teardown {
    config: TeardownConfig,
}

impl Teardown {
    pub const fn new(config: TeardownConfig) -> Self {
        Self { config }
    }

    /// Run `operation` for every item.
    ///
    /// # Errors
    ///
    /// Returns `BatchTimeout` when the batch does not complete before its
    /// deadline; items still running at that time are abandoned.
    pub async fn run<I, F, Fut>(
        &self,
        label: &str,
        items: I,
        operation: F,
    ) -> Result<TeardownStats, TeardownError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let items: Vec<String> = items.into_iter().collect();
        let total = items.len();
        let settled = Arc::new(AtomicUsize::new(0));
        let item_timeout = self.config.item_timeout();

        let batch = stream::iter(items)
            .map(|item| {
                let settled = Arc::clone(&settled);
                let pending = operation(item.clone());
                async move {
                    let outcome = match timeout(item_timeout, pending).await {
                        Ok(Ok(())) => TeardownOutcome::Done,
                        Ok(Err(reason)) => {
                            warn!(item = %item, error = %reason, "Teardown of item failed");
                            TeardownOutcome::Failed(reason)
                        }
                        Err(_) => {
                            warn!(
                                item = %item,
                                timeout_ms = item_timeout.as_millis(),
                                "Teardown of item timed out"
                            );
                            TeardownOutcome::TimedOut
                        }
                    };
                    settled.fetch_add(1, Ordering::AcqRel);
                    outcome
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<TeardownOutcome>>();

        let Ok(outcomes) = timeout(self.config.batch_timeout(), batch).await else {
            let pending = total.saturating_sub(settled.load(Ordering::Acquire));
            warn!(
                label = %label,
                pending,
                timeout_ms = self.config.batch_timeout().as_millis(),
                "Teardown batch timeout exceeded"
            );
            return Err(TeardownError::BatchTimeout {
                pending,
                timeout: self.config.batch_timeout(),
            });
        };

        let stats = outcomes
            .iter()
            .fold(TeardownStats::default(), |mut stats, outcome| {
                match outcome {
                    TeardownOutcome::Done => stats.done = stats.done.saturating_add(1),
                    TeardownOutcome::Failed(_) => stats.failed = stats.failed.saturating_add(1),
                    TeardownOutcome::TimedOut => {
                        stats.timed_out = stats.timed_out.saturating_add(1);
                    }
                }
                stats
            });
        if stats.failed == 0 && stats.timed_out == 0 {
            debug!(label = %label, done = stats.done, "Teardown complete");
        } else {
            info!(
                label = %label,
                done = stats.done,
                failed = stats.failed,
                timed_out = stats.timed_out,
                "Teardown complete with errors"
            );
        }
        Ok(stats)
    }
}
