//! An interface to the ns-3 vehicular simulation.
//!
//! This crate is tightly coupled to the command-line interface of the ns-3 scenario program.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use testbed_core::{ModelScope, SimInvocation, SimulationResult, Simulator, SimulatorError};

/// The default scenario program, relative to the ns-3 tree.
pub const DEFAULT_PROGRAM: &str = "scratch/car_track";

/// How often a running simulator is checked for exit and for an interrupt.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long an interrupted simulator gets to exit after `SIGTERM` before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// An ns-3 simulation run through `waf`.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct Ns3Simulation {
    /// The root of the ns-3 tree, containing `waf`.
    #[builder(setter(into))]
    pub ns3_dir: PathBuf,
    /// The scenario program.
    #[builder(default = DEFAULT_PROGRAM.to_owned(), setter(into))]
    pub program: String,
    /// Run under `sudo`, which the scenario needs to open TAP devices.
    #[builder(default = true)]
    pub sudo: bool,
}

impl Ns3Simulation {
    /// The argument passed to `waf --run`: the program followed by its flags.
    pub fn program_line(&self, invocation: &SimInvocation) -> String {
        let params = &invocation.params;
        let mut line = format!(
            "{} --verbose={} --tracing={} --simTime={}",
            self.program, params.verbose, params.trace, params.sim_time
        );
        match invocation.scope {
            ModelScope::Subset => line.push_str(" --nodes=true"),
            ModelScope::Fleet { size } => {
                line.push_str(&format!(" --nodes=false --numMobileNodes={size}"))
            }
        }
        line
    }

    fn command(&self, invocation: &SimInvocation) -> Command {
        let waf = self.ns3_dir.join("waf");
        let mut cmd = if self.sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(waf);
            cmd
        } else {
            Command::new(waf)
        };
        cmd.arg("--run")
            .arg(self.program_line(invocation))
            .current_dir(&self.ns3_dir);
        cmd
    }
}

impl Simulator for Ns3Simulation {
    fn simulate(
        &self,
        invocation: &SimInvocation,
        interrupted: &AtomicBool,
    ) -> Result<SimulationResult, SimulatorError> {
        let line = self.program_line(invocation);
        log::debug!("{}: ./waf --run '{line}'", self.ns3_dir.display());
        let start = Instant::now();
        let mut child = self
            .command(invocation)
            .spawn()
            .map_err(|source| SimulatorError::Launch {
                program: line.clone(),
                source,
            })?;
        let supervise = |source: io::Error| SimulatorError::Supervise {
            program: line.clone(),
            source,
        };

        // CORRECTNESS: the child may not share our process group or our signals (e.g. under
        // sudo, or when only this process is signalled), so an interrupt is forwarded to it.
        let mut stopping: Option<Instant> = None;
        let status = loop {
            if let Some(status) = child.try_wait().map_err(supervise)? {
                break status;
            }
            match stopping {
                None if interrupted.load(Ordering::SeqCst) => {
                    log::warn!("interrupted; sending SIGTERM to the simulator");
                    let pid = child.id().to_string();
                    if let Err(e) = cmd_lib::run_cmd!(kill -TERM ${pid}) {
                        log::warn!("failed to signal the simulator: {e}");
                    }
                    stopping = Some(Instant::now());
                }
                Some(since) if since.elapsed() >= STOP_GRACE => {
                    log::warn!("simulator still running {STOP_GRACE:?} after SIGTERM; killing it");
                    child.kill().map_err(supervise)?;
                    break child.wait().map_err(supervise)?;
                }
                _ => {}
            }
            thread::sleep(POLL_INTERVAL);
        };
        Ok(SimulationResult::new(status.code(), start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use testbed_core::SimParams;

    fn sim() -> Ns3Simulation {
        Ns3Simulation::builder().ns3_dir("/opt/ns3").build()
    }

    #[test]
    fn program_line_explicit() {
        let params = SimParams::builder()
            .verbose(true)
            .sim_time(120)
            .build();
        let line = sim().program_line(&SimInvocation::new(params, ModelScope::Subset));
        insta::assert_snapshot!(line, @"scratch/car_track --verbose=true --tracing=false --simTime=120 --nodes=true");
    }

    #[test]
    fn program_line_fleet() {
        let line = sim().program_line(&SimInvocation::new(
            SimParams::default(),
            ModelScope::Fleet { size: 16 },
        ));
        insta::assert_snapshot!(line, @"scratch/car_track --verbose=false --tracing=false --simTime=300 --nodes=false --numMobileNodes=16");
    }

    #[test]
    fn missing_tree_is_launch_error() {
        let sim = Ns3Simulation::builder()
            .ns3_dir("/nonexistent/ns3")
            .sudo(false)
            .build();
        let res = sim.simulate(
            &SimInvocation::new(SimParams::default(), ModelScope::Subset),
            &AtomicBool::new(false),
        );
        assert!(matches!(res, Err(SimulatorError::Launch { .. })));
    }

    fn fake_waf(dir: &std::path::Path, script: &str) -> anyhow::Result<Ns3Simulation> {
        use std::os::unix::fs::PermissionsExt;

        let waf = dir.join("waf");
        std::fs::write(&waf, script)?;
        std::fs::set_permissions(&waf, std::fs::Permissions::from_mode(0o755))?;
        Ok(Ns3Simulation::builder().ns3_dir(dir).sudo(false).build())
    }

    #[test]
    fn exit_code_is_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sim = fake_waf(dir.path(), "#!/bin/sh\nexit 3\n")?;
        let result = sim.simulate(
            &SimInvocation::new(SimParams::default(), ModelScope::Subset),
            &AtomicBool::new(false),
        )?;
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
        Ok(())
    }

    #[test]
    fn interrupt_stops_running_simulator() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sim = fake_waf(dir.path(), "#!/bin/sh\nexec sleep 30\n")?;
        let interrupted = std::sync::Arc::new(AtomicBool::new(false));
        let raiser = {
            let interrupted = interrupted.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                interrupted.store(true, Ordering::SeqCst);
            })
        };
        let result = sim.simulate(
            &SimInvocation::new(SimParams::default(), ModelScope::Subset),
            &interrupted,
        )?;
        raiser.join().expect("raiser thread panicked");
        assert!(result.elapsed < STOP_GRACE, "took {:?}", result.elapsed);
        assert_eq!(result.exit_code, None);
        assert!(!result.success());
        Ok(())
    }
}
