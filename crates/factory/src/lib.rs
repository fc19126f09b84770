//! Factory side of horde.
//!
//! - **Keeper**: registers minions, assigns them to competing factories
//!   through the coordination store and rolls their completion up
//! - **Coordination store**: shared key space with atomic primitives
//! - **Local assignment store**: what this factory runs
//! - **Teardown**: bounded fan-out shutdown of minions and scenarios

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod errors;
pub mod keeper;
pub mod local_store;
pub mod scenario_registry;
pub mod shutdown;
pub mod store;

pub use config::{AssignmentConfig, FactoryConfig, TeardownConfig};
pub use errors::{KeeperError, TeardownError};
pub use keeper::{Assignments, FactoriesChannels, MinionAssignmentKeeper};
pub use local_store::{LocalAssignmentStore, MinionAssignments};
pub use scenario_registry::{DagSpec, ScenarioRegistry, ScenarioSpec};
pub use shutdown::{Teardown, TeardownOutcome, TeardownStats};
pub use store::{
    AssignmentMode, CoordinationStore, InMemoryCoordinationStore, KeyLayout, Primitive,
    StoreError,
};
