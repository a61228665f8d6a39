#![warn(unreachable_pub, missing_debug_implementations)]

//! The core testbed library. This crate defines [the orchestrator](Orchestrator) that turns a
//! [node selection](NodeSelection) into TAP interfaces, bridges and containers, runs one
//! simulation over them, and removes them again.
//!
//! Host operations go through the traits in [`host`], so the same orchestration logic runs
//! against a real Linux host or a recording fake.

pub mod addr;
pub mod cleanup;
pub mod container;
pub mod host;
pub mod node;
pub mod nodes;
pub mod orchestrator;
pub mod sim;

#[cfg(test)]
pub(crate) mod testing;

pub use addr::{AllocError, InterfaceAddr, IpAllocator, Subnet, SubnetError};
pub use cleanup::{CleanupStack, Resource, TeardownStep};
pub use container::{ContainerConfig, ContainerError, ContainerLifecycleManager, ContainerState};
pub use host::{BridgeManager, ContainerRuntime, HostError, HostResult, Image, InterfaceManager};
pub use node::{Node, NodeKind, NodeName, NodeNameError};
pub use nodes::{FleetRule, ModelScope, NodeSelection, NodeSet, NodeSetError};
pub use orchestrator::{Error, Orchestrator, Phase, RunReport, TeardownReport};
pub use sim::{SimInvocation, SimParams, SimulationResult, Simulator, SimulatorError};
