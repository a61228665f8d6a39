use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use host_impls::{IpRoute2, Lxc, SystemShell};
use ns3_frontend::Ns3Simulation;
use testbed_core::{ContainerLifecycleManager, NodeSelection, Orchestrator, SimParams};
use testbed_utils::{Environment, RunConfig};

use crate::cli::CarsimArgs;

/// Provisions the testbed, runs one simulation over it and tears it down again.
pub(crate) fn carsim(args: CarsimArgs, mut config: RunConfig) -> anyhow::Result<()> {
    let env = Environment::from_env()?;
    if let Some(subnet) = args.network {
        config.subnet = subnet;
    }
    if let Some(fleet_size) = args.fleet_size {
        config.fleet_size = fleet_size;
    }
    let selection = NodeSelection::new(args.nodes, config.fleet_rule());
    let params = SimParams::builder()
        .verbose(args.verbose)
        .trace(args.trace)
        .sim_time(args.time)
        .build();

    if config.sudo {
        // Host commands run under non-interactive sudo, so ask for the password once up front.
        cmd_lib::run_cmd!(sudo -v).context("failed to obtain sudo credentials")?;
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .with_context(|| "failed to set interrupt handler")?;

    let shell = SystemShell::builder().sudo(config.sudo).build();
    let ip = IpRoute2::new(shell);
    let containers = ContainerLifecycleManager::builder()
        .runtime(Lxc::new(shell))
        .conf_dir(env.conf_dir())
        .image(config.image.clone())
        .build();
    let mut simulator = Ns3Simulation::builder()
        .ns3_dir(env.ns3_home())
        .sudo(config.sudo)
        .build();
    if let Some(program) = &config.program {
        simulator.program = program.clone();
    }
    let mut orchestrator = Orchestrator::builder()
        .interfaces(ip)
        .bridges(ip)
        .containers(containers)
        .simulator(simulator)
        .selection_file(env.selection_file())
        .stop_grace(config.stop_grace())
        .interrupted(interrupted)
        .build();

    let report = orchestrator.run(&selection, config.subnet, &params)?;
    log::info!(
        "ran {} nodes for {}s of simulated time ({:.1?} wall clock)",
        report.nr_nodes,
        params.sim_time,
        report.simulation.elapsed
    );
    if !report.teardown.is_clean() {
        for failure in &report.teardown.failures {
            log::warn!("left behind by failed step `{}`: {}", failure.step, failure.error);
        }
    }
    Ok(())
}
