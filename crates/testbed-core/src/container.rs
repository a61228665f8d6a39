//! Container network configs and the container state machine.
//!
//! ```text
//! undefined --create--> created --start--> started --stop--> stopped --destroy--> destroyed
//! ```
//!
//! Starting an undefined container creates it first. Nothing leaves `destroyed`.

use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};

use crate::addr::InterfaceAddr;
use crate::host::{ContainerRuntime, HostError, Image};
use crate::node::NodeName;

/// The per-node network configuration handed to the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// The bridge the container's veth is linked to.
    pub link: String,
    pub address: InterfaceAddr,
    /// The host-side name of the veth pair.
    pub veth_pair: String,
}

impl ContainerConfig {
    pub fn new(name: &NodeName, bridge: &str, address: InterfaceAddr) -> Self {
        Self {
            link: bridge.to_owned(),
            address,
            veth_pair: name.veth_pair(),
        }
    }

    /// Renders the config as LXC key/value lines.
    pub fn render(&self) -> String {
        let mut s = String::new();
        writeln!(s, "lxc.net.0.type = veth").unwrap();
        writeln!(s, "lxc.net.0.flags = up").unwrap();
        writeln!(s, "lxc.net.0.link = {}", self.link).unwrap();
        writeln!(s, "lxc.net.0.ipv4.address = {}", self.address).unwrap();
        writeln!(s, "lxc.net.0.veth.pair = {}", self.veth_pair).unwrap();
        s
    }
}

/// Where a container is in its lifecycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ContainerState {
    #[default]
    #[display(fmt = "undefined")]
    Undefined,
    #[display(fmt = "created")]
    Created,
    #[display(fmt = "started")]
    Started,
    #[display(fmt = "stopped")]
    Stopped,
    #[display(fmt = "destroyed")]
    Destroyed,
}

/// Drives containers through their lifecycle on top of a [`ContainerRuntime`].
#[derive(Debug, typed_builder::TypedBuilder)]
pub struct ContainerLifecycleManager<R> {
    runtime: R,
    /// The directory rendered configs are written to.
    #[builder(setter(into))]
    conf_dir: PathBuf,
    /// The image every container is created from.
    #[builder(default)]
    image: Image,
    #[builder(default, setter(skip))]
    states: HashMap<NodeName, ContainerState>,
}

impl<R: ContainerRuntime> ContainerLifecycleManager<R> {
    /// The path of `name`'s rendered config.
    pub fn config_path(&self, name: &NodeName) -> PathBuf {
        self.conf_dir.join(name.config_file())
    }

    pub fn state(&self, name: &NodeName) -> ContainerState {
        self.states.get(name).copied().unwrap_or_default()
    }

    /// Writes `name`'s network config, overwriting any previous one.
    pub fn render_config(
        &self,
        name: &NodeName,
        bridge: &str,
        address: InterfaceAddr,
    ) -> Result<PathBuf, ContainerError> {
        let config = ContainerConfig::new(name, bridge, address);
        let path = self.config_path(name);
        fs::create_dir_all(&self.conf_dir).map_err(|source| ContainerError::Config {
            node: name.clone(),
            path: self.conf_dir.clone(),
            source,
        })?;
        fs::write(&path, config.render()).map_err(|source| ContainerError::Config {
            node: name.clone(),
            path: path.clone(),
            source,
        })?;
        debug!("wrote container config {}", path.display());
        Ok(path)
    }

    /// Creates the container from its rendered config.
    pub fn create(&mut self, name: &NodeName) -> Result<(), ContainerError> {
        let state = self.state(name);
        if state != ContainerState::Undefined {
            return Err(ContainerError::InvalidTransition {
                node: name.clone(),
                state,
                op: "create",
            });
        }
        let config = self.config_path(name);
        if !config.exists() {
            return Err(ContainerError::MissingConfig {
                node: name.clone(),
                path: config,
            });
        }
        self.runtime
            .create(name.as_str(), &config, &self.image)
            .map_err(|source| ContainerError::CreateFailed {
                node: name.clone(),
                image: self.image.clone(),
                source,
            })?;
        info!("created container {name}");
        self.states.insert(name.clone(), ContainerState::Created);
        Ok(())
    }

    /// Starts the container, creating it first if it is undefined.
    pub fn start(&mut self, name: &NodeName) -> Result<(), ContainerError> {
        match self.state(name) {
            ContainerState::Undefined => self.create(name)?,
            ContainerState::Created => {}
            ContainerState::Started => return Ok(()),
            state @ (ContainerState::Stopped | ContainerState::Destroyed) => {
                return Err(ContainerError::InvalidTransition {
                    node: name.clone(),
                    state,
                    op: "start",
                })
            }
        }
        self.runtime
            .start(name.as_str())
            .map_err(|source| ContainerError::StartFailed {
                node: name.clone(),
                source,
            })?;
        info!("started container {name}");
        self.states.insert(name.clone(), ContainerState::Started);
        Ok(())
    }

    /// Stops a started container: a clean shutdown bounded by `grace`, then a forced stop.
    ///
    /// A container that was never started has nothing to stop. If the forced stop also fails
    /// the container is reported as [`ContainerError::Unkillable`].
    pub fn stop(&mut self, name: &NodeName, grace: Duration) -> Result<(), ContainerError> {
        match self.state(name) {
            ContainerState::Started => {}
            ContainerState::Undefined | ContainerState::Created | ContainerState::Stopped => {
                return Ok(())
            }
            state @ ContainerState::Destroyed => {
                return Err(ContainerError::InvalidTransition {
                    node: name.clone(),
                    state,
                    op: "stop",
                })
            }
        }
        if let Err(e) = self.runtime.shutdown(name.as_str(), grace) {
            warn!("container {name} did not shut down within {grace:?} ({e}), forcing");
            self.runtime
                .kill(name.as_str())
                .map_err(|source| ContainerError::Unkillable {
                    node: name.clone(),
                    source,
                })?;
        }
        info!("stopped container {name}");
        self.states.insert(name.clone(), ContainerState::Stopped);
        Ok(())
    }

    /// Destroys a created or stopped container. Undefined containers are left alone.
    pub fn destroy(&mut self, name: &NodeName) -> Result<(), ContainerError> {
        match self.state(name) {
            ContainerState::Created | ContainerState::Stopped => {}
            ContainerState::Undefined => return Ok(()),
            state @ (ContainerState::Started | ContainerState::Destroyed) => {
                return Err(ContainerError::InvalidTransition {
                    node: name.clone(),
                    state,
                    op: "destroy",
                })
            }
        }
        self.runtime
            .destroy(name.as_str())
            .map_err(|source| ContainerError::DestroyFailed {
                node: name.clone(),
                source,
            })?;
        info!("destroyed container {name}");
        self.states.insert(name.clone(), ContainerState::Destroyed);
        Ok(())
    }
}

/// Container lifecycle error.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Writing the network config failed.
    #[error("failed to write config for container {node} at {}", .path.display())]
    Config {
        node: NodeName,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The container has no rendered config.
    #[error("container {node} has no config at {}", .path.display())]
    MissingConfig { node: NodeName, path: PathBuf },

    /// Building the root filesystem failed.
    #[error(
        "failed to create container {node} from image {image}; \
        the image release may no longer be published, try a newer one"
    )]
    CreateFailed {
        node: NodeName,
        image: Image,
        #[source]
        source: HostError,
    },

    #[error("failed to start container {node}")]
    StartFailed {
        node: NodeName,
        #[source]
        source: HostError,
    },

    /// Both the clean shutdown and the forced stop failed.
    #[error("container {node} could not be stopped, even forcefully")]
    Unkillable {
        node: NodeName,
        #[source]
        source: HostError,
    },

    #[error("failed to destroy container {node}")]
    DestroyFailed {
        node: NodeName,
        #[source]
        source: HostError,
    },

    /// The operation is not valid in the container's current state.
    #[error("cannot {op} container {node} while it is {state}")]
    InvalidTransition {
        node: NodeName,
        state: ContainerState,
        op: &'static str,
    },
}
