//! The traits that concrete host backends implement. The orchestrator only ever talks to the
//! host through these, so a run can be driven against real kernel objects or a recording fake.

use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;

/// The result of a single host operation.
pub type HostResult = Result<(), HostError>;

/// Creates and destroys TAP interfaces.
///
/// Implementations must treat "already exists" on create and "already absent" on destroy as
/// success, but must report a refused privileged operation as [`HostError::Refused`].
pub trait InterfaceManager {
    /// Creates the TAP interface `name` and brings it up, promiscuous and without an address.
    fn create_interface(&self, name: &str) -> HostResult;

    /// Brings the interface `name` down and removes it.
    fn destroy_interface(&self, name: &str) -> HostResult;
}

/// Creates and destroys layer-2 bridges with a single member interface.
pub trait BridgeManager {
    /// Creates `bridge`, attaches `member` (which must already exist) and brings the bridge up.
    fn create_bridge(&self, bridge: &str, member: &str) -> HostResult;

    /// Brings `bridge` down, detaches `member` and removes the bridge.
    fn destroy_bridge(&self, bridge: &str, member: &str) -> HostResult;
}

/// The primitive operations of a container runtime. State tracking lives in
/// [`ContainerLifecycleManager`](crate::container::ContainerLifecycleManager).
pub trait ContainerRuntime {
    /// Materializes the container's root filesystem from `image` using the network config at
    /// `config`.
    fn create(&self, name: &str, config: &Path, image: &Image) -> HostResult;

    fn start(&self, name: &str) -> HostResult;

    /// Asks the container to shut down cleanly, giving up after `grace`.
    fn shutdown(&self, name: &str, grace: Duration) -> HostResult;

    /// Stops the container forcefully.
    fn kill(&self, name: &str) -> HostResult;

    fn destroy(&self, name: &str) -> HostResult;
}

impl<T: InterfaceManager> InterfaceManager for &T {
    fn create_interface(&self, name: &str) -> HostResult {
        (*self).create_interface(name)
    }

    fn destroy_interface(&self, name: &str) -> HostResult {
        (*self).destroy_interface(name)
    }
}

impl<T: BridgeManager> BridgeManager for &T {
    fn create_bridge(&self, bridge: &str, member: &str) -> HostResult {
        (*self).create_bridge(bridge, member)
    }

    fn destroy_bridge(&self, bridge: &str, member: &str) -> HostResult {
        (*self).destroy_bridge(bridge, member)
    }
}

impl<T: ContainerRuntime> ContainerRuntime for &T {
    fn create(&self, name: &str, config: &Path, image: &Image) -> HostResult {
        (*self).create(name, config, image)
    }

    fn start(&self, name: &str) -> HostResult {
        (*self).start(name)
    }

    fn shutdown(&self, name: &str, grace: Duration) -> HostResult {
        (*self).shutdown(name, grace)
    }

    fn kill(&self, name: &str) -> HostResult {
        (*self).kill(name)
    }

    fn destroy(&self, name: &str) -> HostResult {
        (*self).destroy(name)
    }
}

/// The distribution/release/architecture triple a container root filesystem is built from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Image {
    pub dist: String,
    pub release: String,
    pub arch: String,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            dist: "fedora".to_owned(),
            release: "31".to_owned(),
            arch: "amd64".to_owned(),
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dist, self.release, self.arch)
    }
}

/// A failed host operation.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The operation was refused for lack of privilege.
    #[error("`{command}` was refused: {reason}")]
    Refused { command: String, reason: String },

    /// The command ran and failed.
    #[error("`{command}` failed ({status}): {reason}")]
    Failed {
        command: String,
        status: String,
        reason: String,
    },

    /// The command could not be run at all.
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}
