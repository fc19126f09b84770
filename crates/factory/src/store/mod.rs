//! Coordination store shared by all the factories of a campaign.
//!
//! The store exposes plain key operations plus three atomic primitives,
//! [`Primitive::Register`], [`Primitive::Assign`] and [`Primitive::Complete`].
//! A primitive must be
//! loaded before it can be invoked; the store then knows it by a handle
//! derived from the hash of its source. Stores may forget loaded primitives
//! at any time, in which case an invocation fails with
//! [`StoreError::UnknownPrimitive`] and the caller has to load it again.

pub mod keys;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use horde_core::{CampaignCompletionState, ChannelName, DagId, MinionId, ScenarioName};

pub use keys::KeyLayout;
pub use memory::InMemoryCoordinationStore;

/// Errors raised by a coordination store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The primitive handle is not (or no longer) known by the store.
    #[error("unknown primitive: {0}")]
    UnknownPrimitive(PrimitiveHandle),

    #[error("key '{key}' holds a {found}, expected a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub const fn unknown_primitive(handle: PrimitiveHandle) -> Self {
        Self::UnknownPrimitive(handle)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// The atomic operations a store has to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Register,
    Assign,
    Complete,
}

impl Primitive {
    /// Source of the primitive, as submitted to the store.
    pub const fn source(self) -> &'static str {
        match self {
            Self::Register => {
                "horde.register/v1: skip minions already known; set remaining and total DAG \
                 counters; queue singletons or unassigned DAGs; count under-load minions and scenarios"
            }
            Self::Assign => {
                "horde.assign/v1: claim singletons; pop unassigned minions not yet evaluated \
                 by the caller; move the DAGs the caller runs to its channel; record the root owner"
            }
            Self::Complete => {
                "horde.complete/v1: decrement minion remaining DAGs; roll minion, scenario and \
                 campaign counters; purge the campaign when no scenario remains"
            }
        }
    }

    /// Content hash of the source.
    pub fn handle(self) -> PrimitiveHandle {
        let digest = Sha256::digest(self.source().as_bytes());
        PrimitiveHandle(
            digest
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<String>(),
        )
    }
}

/// Identifier of a loaded primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveHandle(String);

impl PrimitiveHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimitiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the DAGs of a minion may be spread across factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentMode {
    /// All the DAGs of a minion run on the factory owning its root DAG.
    SingleLocation,
    /// The DAGs of a minion may be split across factories.
    DistributedMinion,
}

/// Input of [`Primitive::Register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub layout: KeyLayout,
    pub scenario: ScenarioName,
    pub dag_ids: Vec<DagId>,
    pub minions: Vec<MinionId>,
    pub under_load: bool,
    pub mode: AssignmentMode,
}

/// Input of [`Primitive::Assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRequest {
    pub layout: KeyLayout,
    pub scenario: ScenarioName,
    /// Unicast channel of the calling factory.
    pub channel: ChannelName,
    pub root_dag: DagId,
    pub mode: AssignmentMode,
    /// Maximal number of minions to evaluate.
    pub batch_size: usize,
    /// Maximal number of under-load minions the caller may still take.
    pub capacity: u32,
}

/// Output of [`Primitive::Assign`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignOutcome {
    /// Minions evaluated by this call, assigned or not.
    pub evaluated: usize,
    /// Under-load minions that received at least one DAG.
    pub assigned_under_load: u32,
    pub assignments: BTreeMap<MinionId, BTreeSet<DagId>>,
}

/// Input of [`Primitive::Complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteRequest {
    pub layout: KeyLayout,
    pub scenario: ScenarioName,
    pub minion: MinionId,
    pub dag_ids: Vec<DagId>,
    pub might_restart: bool,
}

/// A shared, atomically mutable store.
///
/// Plain operations are individually atomic; the primitives are atomic as a
/// whole across every concurrent caller.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Load a primitive and return its handle.
    async fn load(&self, primitive: Primitive) -> Result<PrimitiveHandle, StoreError>;

    /// Register minions, returning how many were not known yet.
    async fn register(
        &self,
        handle: &PrimitiveHandle,
        request: RegisterRequest,
    ) -> Result<usize, StoreError>;

    async fn assign(
        &self,
        handle: &PrimitiveHandle,
        request: AssignRequest,
    ) -> Result<AssignOutcome, StoreError>;

    async fn complete(
        &self,
        handle: &PrimitiveHandle,
        request: CompleteRequest,
    ) -> Result<CampaignCompletionState, StoreError>;

    /// Add members to a set, returning how many were not present.
    async fn add_to_set(&self, key: &str, members: &[String]) -> Result<usize, StoreError>;

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StoreError>;

    async fn hash_set_all(
        &self,
        key: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Set a field only if absent, returning whether it was set.
    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError>;

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError>;

    async fn counter_set(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError>;

    /// Add `delta` to a counter field, returning the new value.
    async fn counter_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError>;

    async fn counter_get(&self, key: &str, field: &str) -> Result<Option<i64>, StoreError>;

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError>;

    /// Delete every key starting with `prefix`, returning how many were deleted.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_stable_content_hashes() {
        assert_eq!(Primitive::Assign.handle(), Primitive::Assign.handle());
        assert_ne!(Primitive::Assign.handle(), Primitive::Complete.handle());
        assert_ne!(Primitive::Register.handle(), Primitive::Assign.handle());
        assert_eq!(Primitive::Complete.handle().as_str().len(), 64);
    }
}
