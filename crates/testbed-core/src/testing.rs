use std::cell::{Cell, RefCell};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::host::{BridgeManager, ContainerRuntime, HostError, HostResult, Image, InterfaceManager};
use crate::sim::{SimInvocation, SimulationResult, Simulator, SimulatorError};

/// A host operation, as recorded by [`FakeHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    CreateInterface(String),
    DestroyInterface(String),
    CreateBridge(String, String),
    DestroyBridge(String, String),
    CreateContainer(String),
    StartContainer(String),
    ShutdownContainer(String),
    KillContainer(String),
    DestroyContainer(String),
    Simulate(SimInvocation),
}

/// A host that records every operation instead of performing it. Operations registered with
/// [`FakeHost::fail`] are still recorded, then refused.
#[derive(Debug, Default)]
pub(crate) struct FakeHost {
    ops: RefCell<Vec<Op>>,
    failing: RefCell<Vec<Op>>,
    exit_code: Cell<i32>,
    trip: RefCell<Option<(Op, Arc<AtomicBool>)>>,
}

impl FakeHost {
    pub(crate) fn fail(&self, op: Op) {
        self.failing.borrow_mut().push(op);
    }

    /// Makes the simulator exit with `code`.
    pub(crate) fn exit_with(&self, code: i32) {
        self.exit_code.set(code);
    }

    /// Raises `flag` once `op` has been performed.
    pub(crate) fn interrupt_after(&self, op: Op, flag: Arc<AtomicBool>) {
        *self.trip.borrow_mut() = Some((op, flag));
    }

    pub(crate) fn ops(&self) -> Vec<Op> {
        self.ops.borrow().clone()
    }

    fn record(&self, op: Op) -> HostResult {
        if self.failing.borrow().contains(&op) {
            self.ops.borrow_mut().push(op.clone());
            return Err(HostError::Refused {
                command: format!("{op:?}"),
                reason: "Operation not permitted".to_owned(),
            });
        }
        self.perform(op);
        Ok(())
    }

    fn perform(&self, op: Op) {
        if let Some((trip, flag)) = &*self.trip.borrow() {
            if *trip == op {
                flag.store(true, Ordering::SeqCst);
            }
        }
        self.ops.borrow_mut().push(op);
    }
}

impl InterfaceManager for FakeHost {
    fn create_interface(&self, name: &str) -> HostResult {
        self.record(Op::CreateInterface(name.to_owned()))
    }

    fn destroy_interface(&self, name: &str) -> HostResult {
        self.record(Op::DestroyInterface(name.to_owned()))
    }
}

impl BridgeManager for FakeHost {
    fn create_bridge(&self, bridge: &str, member: &str) -> HostResult {
        self.record(Op::CreateBridge(bridge.to_owned(), member.to_owned()))
    }

    fn destroy_bridge(&self, bridge: &str, member: &str) -> HostResult {
        self.record(Op::DestroyBridge(bridge.to_owned(), member.to_owned()))
    }
}

impl ContainerRuntime for FakeHost {
    fn create(&self, name: &str, _: &Path, _: &Image) -> HostResult {
        self.record(Op::CreateContainer(name.to_owned()))
    }

    fn start(&self, name: &str) -> HostResult {
        self.record(Op::StartContainer(name.to_owned()))
    }

    fn shutdown(&self, name: &str, _: Duration) -> HostResult {
        self.record(Op::ShutdownContainer(name.to_owned()))
    }

    fn kill(&self, name: &str) -> HostResult {
        self.record(Op::KillContainer(name.to_owned()))
    }

    fn destroy(&self, name: &str) -> HostResult {
        self.record(Op::DestroyContainer(name.to_owned()))
    }
}

impl Simulator for FakeHost {
    fn simulate(
        &self,
        invocation: &SimInvocation,
        interrupted: &AtomicBool,
    ) -> Result<SimulationResult, SimulatorError> {
        self.perform(Op::Simulate(invocation.clone()));
        // A real simulator is stopped by a signal once interrupted.
        let exit_code = if interrupted.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.exit_code.get())
        };
        Ok(SimulationResult::new(exit_code, Duration::from_millis(1)))
    }
}
