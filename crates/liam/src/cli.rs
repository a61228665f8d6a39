use std::path::PathBuf;

use clap::{Parser, Subcommand};
use testbed_core::{NodeName, Subnet};

/// Liam In A Machine: development helper for the vehicular network testbed.
#[derive(Parser, Debug)]
#[command(name = "liam", version, disable_version_flag = true)]
pub(crate) struct Args {
    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Run configuration file (JSON or Dhall)
    #[arg(short, long, global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run a configured program, e.g. eclipse or netanim
    Run {
        /// The program to run
        program: String,
    },

    /// Provision the testbed, run the ns-3 car simulation, and tear the testbed down
    Carsim(CarsimArgs),

    /// Commit and push the backup repository
    Save {
        /// Repository to save, overriding the configured one
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Commit message
        #[arg(short, long, default_value = "liam save")]
        message: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct CarsimArgs {
    /// Nodes to provision, e.g. `--nodes n1c1 n3c2`; the whole fleet if omitted
    #[arg(long, num_args = 1..)]
    pub(crate) nodes: Vec<NodeName>,

    /// Subnet to allocate node addresses from
    #[arg(long)]
    pub(crate) network: Option<Subnet>,

    /// Simulated time in seconds
    #[arg(long, default_value_t = 300)]
    pub(crate) time: u64,

    /// Number of fleet nodes when no nodes are named
    #[arg(long)]
    pub(crate) fleet_size: Option<usize>,

    /// Enable simulator logging (and debug logging here)
    #[arg(long)]
    pub(crate) verbose: bool,

    /// Enable packet tracing
    #[arg(long)]
    pub(crate) trace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn carsim_args() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "liam",
            "carsim",
            "--nodes",
            "n1c1",
            "n3c2",
            "--network",
            "10.0.0.0/24",
            "--time",
            "120",
            "--verbose",
        ])?;
        let Command::Carsim(carsim) = args.command else {
            panic!("expected carsim");
        };
        let nodes = carsim.nodes.iter().map(NodeName::as_str).collect::<Vec<_>>();
        assert_eq!(nodes, vec!["n1c1", "n3c2"]);
        assert_eq!(carsim.network, Some("10.0.0.0/24".parse()?));
        assert_eq!(carsim.time, 120);
        assert!(carsim.verbose);
        assert!(!carsim.trace);
        Ok(())
    }

    #[test]
    fn carsim_defaults() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["liam", "carsim"])?;
        let Command::Carsim(carsim) = args.command else {
            panic!("expected carsim");
        };
        assert!(carsim.nodes.is_empty());
        assert_eq!(carsim.time, 300);
        assert_eq!(carsim.network, None);
        Ok(())
    }

    #[test]
    fn bad_node_name_is_rejected() {
        assert!(Args::try_parse_from(["liam", "carsim", "--nodes", "n1-c1"]).is_err());
    }

    #[test]
    fn short_version_flag() {
        let err = Args::try_parse_from(["liam", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
