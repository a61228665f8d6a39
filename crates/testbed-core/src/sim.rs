//! The boundary to the external network simulator.

use std::io;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::nodes::ModelScope;

/// An interface for the external network simulator.
pub trait Simulator {
    /// Runs the simulator to completion. A simulator that ran and exited non-zero is an `Ok`
    /// result; only failing to run it at all is an error.
    ///
    /// CORRECTNESS: once `interrupted` is raised the simulator must be stopped and this must
    /// return promptly, so that teardown can run.
    fn simulate(
        &self,
        invocation: &SimInvocation,
        interrupted: &AtomicBool,
    ) -> Result<SimulationResult, SimulatorError>;
}

impl<S: Simulator> Simulator for &S {
    fn simulate(
        &self,
        invocation: &SimInvocation,
        interrupted: &AtomicBool,
    ) -> Result<SimulationResult, SimulatorError> {
        (*self).simulate(invocation, interrupted)
    }
}

/// User-facing simulation parameters.
#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct SimParams {
    /// Enable the simulator's application logging.
    #[builder(default)]
    pub verbose: bool,
    /// Enable packet tracing.
    #[builder(default)]
    pub trace: bool,
    /// Simulated duration in seconds.
    #[builder(default = 300)]
    pub sim_time: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything the simulator process is told.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct SimInvocation {
    pub params: SimParams,
    pub scope: ModelScope,
}

/// The outcome of a simulator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct SimulationResult {
    /// The exit code, or `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock time the simulator ran for.
    pub elapsed: Duration,
}

impl SimulationResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Error running the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// The simulator process could not be spawned.
    #[error("failed to launch `{program}`")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The running simulator could not be waited on or stopped.
    #[error("failed to supervise `{program}`")]
    Supervise {
        program: String,
        #[source]
        source: io::Error,
    },
}
