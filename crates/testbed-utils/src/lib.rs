//! Utilities for configuring testbed runs: the host environment and run-configuration files.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use testbed_core::{FleetRule, Image, Subnet};

/// The environment variable naming the ns-3 installation.
pub const NS3_HOME: &str = "NS3_HOME";

/// Host paths derived from the ns-3 installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    ns3_home: PathBuf,
}

impl Environment {
    /// Creates an environment rooted at `ns3_home`.
    pub fn new(ns3_home: impl Into<PathBuf>) -> Self {
        Self {
            ns3_home: ns3_home.into(),
        }
    }

    /// Reads the environment from `NS3_HOME`, which must be set and non-empty.
    pub fn from_env() -> Result<Self, Error> {
        std::env::var_os(NS3_HOME)
            .filter(|home| !home.is_empty())
            .map(Self::new)
            .ok_or(Error::MissingEnv(NS3_HOME))
    }

    /// The ns-3 tree, where the simulator runs.
    pub fn ns3_home(&self) -> &Path {
        &self.ns3_home
    }

    /// The directory container network configs are written to.
    pub fn conf_dir(&self) -> PathBuf {
        self.ns3_home.join("..").join("cont_conf")
    }

    /// The node-selection file the simulator reads.
    pub fn selection_file(&self) -> PathBuf {
        self.ns3_home.join("nodesToUse.txt")
    }
}

/// A desktop tool launched by `liam run`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    /// The directory to launch from. Relative paths are relative to the home directory.
    pub dir: PathBuf,
    /// The command line, run by the shell.
    pub command: String,
}

impl Program {
    fn new(dir: &str, command: &str) -> Self {
        Self {
            dir: dir.into(),
            command: command.to_owned(),
        }
    }
}

/// Settings for a testbed run. Every field is optional in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// The subnet node addresses are allocated from.
    pub subnet: Subnet,
    /// The number of fleet nodes provisioned when no nodes are named.
    pub fleet_size: usize,
    /// Fleet indices that carry only their first car interface.
    pub single_interface_nodes: Vec<usize>,
    /// The image every container is built from.
    pub image: Image,
    /// Seconds a container gets to shut down before it is forced.
    pub stop_grace_secs: u64,
    /// Run privileged commands through `sudo`.
    pub sudo: bool,
    /// Overrides the simulator's scenario program, which otherwise defaults to the one the
    /// simulator frontend ships with.
    pub program: Option<String>,
    /// Tools `liam run` can launch, by name.
    pub programs: BTreeMap<String, Program>,
    /// The repository `liam save` commits and pushes. Relative paths are relative to the home
    /// directory.
    pub backup_repo: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        let programs = [
            ("eclipse", Program::new("eclipse/cpp-2019-12/eclipse", "./eclipse")),
            ("netanim", Program::new("ns-3/source/netanim-3.108", "./NetAnim")),
            ("pycharm", Program::new("pycharm-community-2019.3.4/bin", "./pycharm.sh")),
        ]
        .into_iter()
        .map(|(name, program)| (name.to_owned(), program))
        .collect();
        Self {
            subnet: Subnet::default(),
            fleet_size: 16,
            single_interface_nodes: vec![9, 12],
            image: Image::default(),
            stop_grace_secs: 30,
            sudo: true,
            program: None,
            programs,
            backup_repo: "nuigcar".into(),
        }
    }
}

impl RunConfig {
    /// The fleet-generation rule.
    pub fn fleet_rule(&self) -> FleetRule {
        FleetRule::builder()
            .size(self.fleet_size)
            .single_interface(self.single_interface_nodes.clone())
            .build()
    }

    /// The graceful-stop grace period.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// Reads a [`RunConfig`] from a file in JSON or Dhall format.
pub fn read_run_config(path: impl AsRef<Path>) -> Result<RunConfig, Error> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: RunConfig = match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        Some("dhall") => serde_dhall::from_str(&contents).parse().map_err(Box::new)?,
        _ => return Err(Error::UnknownFileType(path.as_ref().into())),
    };
    Ok(config)
}

/// Error kinds for configuration and I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required environment variable is unset.
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// Error deserializing Dhall.
    #[error("Dhall error")]
    Dhall(#[from] Box<serde_dhall::Error>),

    /// Error deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),
}
