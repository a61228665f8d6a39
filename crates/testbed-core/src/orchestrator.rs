//! The testbed orchestrator: resolves the node set, provisions interfaces, bridges and
//! containers in dependency order, runs the simulator, and tears everything down again on
//! every exit path.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::addr::{AllocError, InterfaceAddr, IpAllocator, Subnet};
use crate::cleanup::{CleanupStack, Resource, TeardownStep};
use crate::container::{ContainerError, ContainerLifecycleManager};
use crate::host::{BridgeManager, ContainerRuntime, HostError, Image, InterfaceManager};
use crate::node::{Node, NodeKind, NodeName};
use crate::nodes::{self, FleetRule, NodeSelection, NodeSet, NodeSetError};
use crate::sim::{SimInvocation, SimParams, SimulationResult, Simulator, SimulatorError};

/// Drives one provision → simulate → teardown cycle.
#[derive(Debug, typed_builder::TypedBuilder)]
pub struct Orchestrator<I, B, R, S> {
    interfaces: I,
    bridges: B,
    containers: ContainerLifecycleManager<R>,
    simulator: S,
    /// Where the node-selection file for explicit runs is written.
    #[builder(setter(into))]
    selection_file: PathBuf,
    /// How long a container gets to shut down cleanly before it is forced.
    #[builder(default = Duration::from_secs(30))]
    stop_grace: Duration,
    /// Set asynchronously (e.g. by a signal handler) to abandon provisioning.
    #[builder(default)]
    interrupted: Arc<AtomicBool>,
}

impl<I, B, R, S> Orchestrator<I, B, R, S>
where
    I: InterfaceManager,
    B: BridgeManager,
    R: ContainerRuntime,
    S: Simulator,
{
    /// Runs the testbed end to end.
    ///
    /// Teardown runs whether provisioning and the simulation succeed or not. The result is
    /// `Ok` only if provisioning and the simulation both fully succeeded and teardown was not
    /// aborted; individual teardown failures are recorded in the report.
    pub fn run(
        &mut self,
        selection: &NodeSelection,
        subnet: Subnet,
        params: &SimParams,
    ) -> Result<RunReport, Error> {
        if let NodeSelection::Fleet(rule) = selection {
            check_fleet_capacity(rule, subnet)?;
        }
        let nodes = NodeSet::resolve(selection)?;
        let plan = plan(&nodes, subnet)?;
        info!(
            "provisioning {} nodes ({} selected) on {subnet}",
            nodes.len(),
            nodes.members().count()
        );

        let mut stack = CleanupStack::default();
        let outcome = self
            .provision(&plan, &mut stack)
            .and_then(|()| self.simulate(&nodes, params));
        let teardown = self.teardown(&mut stack);

        match (outcome, teardown) {
            (outcome, Err(e)) => {
                if let Err(first) = outcome {
                    error!("{first}");
                }
                Err(e)
            }
            (Err(e), Ok(_)) => Err(e),
            (Ok(simulation), Ok(_)) if !simulation.success() => Err(Error::SimulationFailed {
                exit_code: simulation.exit_code,
            }),
            (Ok(simulation), Ok(teardown)) => Ok(RunReport {
                nr_nodes: nodes.len(),
                simulation,
                teardown,
            }),
        }
    }

    fn provision(&mut self, plan: &[Planned], stack: &mut CleanupStack) -> Result<(), Error> {
        for Planned { node, .. } in plan {
            self.check_interrupt(Phase::Interfaces)?;
            let tap = node.name.tap();
            self.interfaces
                .create_interface(&tap)
                .map_err(|source| Error::PrivilegedOpFailed {
                    phase: Phase::Interfaces,
                    resource: tap.clone(),
                    source,
                })?;
            debug!("created interface {tap}");
            stack.push(Resource::Interface(tap));
        }

        // CORRECTNESS: Every bridge's member interface exists by now.
        for Planned { node, .. } in plan {
            self.check_interrupt(Phase::Bridges)?;
            let (bridge, member) = (node.name.bridge(), node.name.tap());
            self.bridges
                .create_bridge(&bridge, &member)
                .map_err(|source| Error::PrivilegedOpFailed {
                    phase: Phase::Bridges,
                    resource: bridge.clone(),
                    source,
                })?;
            debug!("created bridge {bridge} with {member}");
            stack.push(Resource::Bridge { bridge, member });
        }

        for Planned { node, address } in plan {
            self.check_interrupt(Phase::Configs)?;
            self.containers
                .render_config(&node.name, &node.name.bridge(), *address)
                .map_err(|e| Error::from_container(Phase::Configs, e))?;
        }

        for Planned { node, .. } in plan {
            self.check_interrupt(Phase::Containers)?;
            self.containers
                .create(&node.name)
                .map_err(|e| Error::from_container(Phase::Containers, e))?;
            stack.push(Resource::Container(node.name.clone()));
        }
        for Planned { node, .. } in plan {
            self.check_interrupt(Phase::Containers)?;
            self.containers
                .start(&node.name)
                .map_err(|e| Error::from_container(Phase::Containers, e))?;
        }
        info!("provisioned {} resources", stack.len());
        Ok(())
    }

    fn simulate(
        &mut self,
        nodes: &NodeSet,
        params: &SimParams,
    ) -> Result<SimulationResult, Error> {
        self.check_interrupt(Phase::Simulation)?;
        if nodes.is_explicit() {
            nodes::write_node_selection(&self.selection_file, nodes).map_err(|source| {
                Error::Io {
                    path: self.selection_file.clone(),
                    source,
                }
            })?;
            debug!("wrote node selection to {}", self.selection_file.display());
        }
        let invocation = SimInvocation::new(params.clone(), nodes.scope());
        info!("running simulation for {}s", params.sim_time);
        let result = self.simulator.simulate(&invocation, &self.interrupted)?;
        if self.interrupted.load(Ordering::SeqCst) {
            warn!(
                "interrupted during {}; simulator stopped after {:.1?}",
                Phase::Simulation,
                result.elapsed
            );
            return Err(Error::Interrupted {
                phase: Phase::Simulation,
            });
        }
        if result.success() {
            info!("simulation finished in {:.1?}", result.elapsed);
        } else {
            error!(
                "simulation exited with {} after {:.1?}",
                describe_exit(&result.exit_code),
                result.elapsed
            );
        }
        Ok(result)
    }

    /// Tears down everything on `stack`, leaving it empty. Tearing down an empty stack does
    /// nothing.
    ///
    /// Failures are logged and teardown moves on, except for a container that cannot be
    /// stopped: its bridge cannot be safely removed, so teardown stops there.
    pub fn teardown(&mut self, stack: &mut CleanupStack) -> Result<TeardownReport, Error> {
        let plan = stack.take_plan();
        let mut report = TeardownReport::default();
        if plan.is_empty() {
            debug!("nothing to tear down");
            return Ok(report);
        }
        info!("tearing down ({} steps)", plan.len());
        for (i, step) in plan.iter().enumerate() {
            let res = match step {
                TeardownStep::StopContainer(name) => self
                    .containers
                    .stop(name, self.stop_grace)
                    .map_err(|e| Error::from_container(Phase::Teardown, e)),
                TeardownStep::DestroyContainer(name) => self
                    .containers
                    .destroy(name)
                    .map_err(|e| Error::from_container(Phase::Teardown, e)),
                TeardownStep::DestroyBridge { bridge, member } => self
                    .bridges
                    .destroy_bridge(bridge, member)
                    .map_err(|source| Error::PrivilegedOpFailed {
                        phase: Phase::Teardown,
                        resource: bridge.clone(),
                        source,
                    }),
                TeardownStep::DestroyInterface(name) => self
                    .interfaces
                    .destroy_interface(name)
                    .map_err(|source| Error::PrivilegedOpFailed {
                        phase: Phase::Teardown,
                        resource: name.clone(),
                        source,
                    }),
            };
            report.nr_steps += 1;
            match res {
                Ok(()) => debug!("teardown: {step}"),
                Err(Error::ContainerUnkillable { node, source, .. }) => {
                    let pending = plan[i + 1..].iter().map(ToString::to_string).collect();
                    let e = Error::ContainerUnkillable {
                        node,
                        pending,
                        source,
                    };
                    error!("{e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!("teardown: failed to {step}: {e}");
                    report.failures.push(TeardownFailure {
                        step: step.clone(),
                        error: e,
                    });
                }
            }
        }
        if report.failures.is_empty() {
            info!("teardown complete");
        } else {
            warn!(
                "teardown finished with {} failures; leftover resources may need manual removal",
                report.failures.len()
            );
        }
        Ok(report)
    }

    fn check_interrupt(&self, phase: Phase) -> Result<(), Error> {
        if self.interrupted.load(Ordering::SeqCst) {
            warn!("interrupted during {phase}");
            return Err(Error::Interrupted { phase });
        }
        Ok(())
    }
}

/// A node with its allocated address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planned {
    pub node: Node,
    pub address: InterfaceAddr,
}

/// Allocates every node's address up front, before any host state is touched.
/// Checks that a fleet fits `subnet` before any of its member names are generated.
fn check_fleet_capacity(rule: &FleetRule, subnet: Subnet) -> Result<(), Error> {
    rule.validate()?;
    let capacity = usize::try_from(subnet.member_capacity()).unwrap_or(usize::MAX);
    if rule.nr_members() <= capacity {
        return Ok(());
    }
    match rule.iter_members().nth(capacity) {
        Some(node) => Err(Error::RangeExhausted {
            node,
            source: AllocError::RangeExhausted {
                subnet,
                ordinal: capacity,
            },
        }),
        None => Ok(()),
    }
}

pub fn plan(nodes: &NodeSet, subnet: Subnet) -> Result<Vec<Planned>, Error> {
    let mut alloc = IpAllocator::new(subnet);
    nodes
        .iter()
        .map(|node| {
            let address = match node.kind {
                NodeKind::Infrastructure => alloc.infrastructure(),
                NodeKind::Member => alloc.next_address(),
            }
            .map_err(|source| Error::RangeExhausted {
                node: node.name.clone(),
                source,
            })?;
            Ok(Planned {
                node: node.clone(),
                address,
            })
        })
        .collect()
}

/// A successful run.
#[derive(Debug)]
pub struct RunReport {
    /// Number of nodes provisioned, infrastructure included.
    pub nr_nodes: usize,
    pub simulation: SimulationResult,
    pub teardown: TeardownReport,
}

/// What teardown did.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub nr_steps: usize,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A teardown step that failed without aborting teardown.
#[derive(Debug)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub error: Error,
}

/// The phase a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Phase {
    #[display(fmt = "interface provisioning")]
    Interfaces,
    #[display(fmt = "bridge provisioning")]
    Bridges,
    #[display(fmt = "container config rendering")]
    Configs,
    #[display(fmt = "container provisioning")]
    Containers,
    #[display(fmt = "simulation")]
    Simulation,
    #[display(fmt = "teardown")]
    Teardown,
}

/// The error type for [`Orchestrator::run`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The node selection is invalid.
    #[error("invalid node selection")]
    InvalidNodeSet(#[from] NodeSetError),

    /// The subnet has too few addresses for the node set.
    #[error("address allocation failed for node {node}")]
    RangeExhausted {
        node: NodeName,
        #[source]
        source: AllocError,
    },

    /// An interface, bridge or container command failed.
    #[error("{phase} failed on {resource}")]
    PrivilegedOpFailed {
        phase: Phase,
        resource: String,
        #[source]
        source: HostError,
    },

    /// A container root filesystem could not be created.
    #[error(
        "container provisioning failed on {node}: could not create it from image {image}; \
        the image release is probably stale and needs to be bumped"
    )]
    CreateFailed {
        node: NodeName,
        image: Image,
        #[source]
        source: HostError,
    },

    /// A container survived both a clean and a forced stop.
    #[error(
        "teardown aborted: container {node} could not be stopped, even forcefully; \
        stop it by hand, then remove what is left: [{}]",
        .pending.join(", ")
    )]
    ContainerUnkillable {
        node: NodeName,
        /// Teardown steps that were not attempted.
        pending: Vec<String>,
        #[source]
        source: HostError,
    },

    /// A container operation was attempted in the wrong state.
    #[error("{phase} failed")]
    InvalidTransition {
        phase: Phase,
        #[source]
        source: ContainerError,
    },

    /// A container config or the node-selection file could not be written.
    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The simulator could not be run.
    #[error("failed to run the simulator")]
    SimulatorLaunch(#[from] SimulatorError),

    /// The simulator ran and reported failure.
    #[error("simulation failed: simulator exited with {}", describe_exit(.exit_code))]
    SimulationFailed { exit_code: Option<i32> },

    /// An interrupt was received.
    #[error("interrupted during {phase}")]
    Interrupted { phase: Phase },
}

impl Error {
    fn from_container(phase: Phase, e: ContainerError) -> Self {
        match e {
            ContainerError::CreateFailed {
                node,
                image,
                source,
            } => Error::CreateFailed {
                node,
                image,
                source,
            },
            ContainerError::Unkillable { node, source } => Error::ContainerUnkillable {
                node,
                pending: Vec::new(),
                source,
            },
            ContainerError::StartFailed { node, source }
            | ContainerError::DestroyFailed { node, source } => Error::PrivilegedOpFailed {
                phase,
                resource: format!("container {node}"),
                source,
            },
            ContainerError::Config { path, source, .. } => Error::Io { path, source },
            source @ (ContainerError::MissingConfig { .. }
            | ContainerError::InvalidTransition { .. }) => {
                Error::InvalidTransition { phase, source }
            }
        }
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_owned(),
    }
}
