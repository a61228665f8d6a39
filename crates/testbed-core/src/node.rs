//! Node identities and the host resource names derived from them.

use std::str::FromStr;

/// The longest identifier whose derived names (`tap-<id>`, `<id>-veth`) still fit in a Linux
/// interface name (15 bytes).
pub const MAX_NAME_LEN: usize = 10;

/// A node identifier such as `dc`, `car` or `n3c2`.
///
/// Every host resource belonging to a node is named after it, so two nodes with the same
/// name would fight over the same interface, bridge and container.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

impl NodeName {
    /// The data-centre node.
    pub fn data_centre() -> Self {
        Self("dc".to_owned())
    }

    /// The control vehicle.
    pub fn control_car() -> Self {
        Self("car".to_owned())
    }

    /// The `car`th car interface of fleet node `index`, e.g. `n4c2`.
    ///
    /// The name is only valid for indices up to
    /// [`FleetRule::MAX_SIZE`](crate::nodes::FleetRule::MAX_SIZE) and single-digit `car`s,
    /// which [`NodeSet::resolve`](crate::nodes::NodeSet::resolve) enforces.
    pub fn fleet(index: usize, car: usize) -> Self {
        let name = format!("n{index}c{car}");
        debug_assert!(name.len() <= MAX_NAME_LEN, "fleet name {name} is too long");
        Self(name)
    }

    /// Validates and wraps a node name.
    pub fn new(name: impl Into<String>) -> Result<Self, NodeNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NodeNameError::Empty);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(NodeNameError::TooLong(name));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(NodeNameError::InvalidChars(name));
        }
        Ok(Self(name))
    }

    /// The TAP interface carrying this node's traffic into the simulator.
    pub fn tap(&self) -> String {
        format!("tap-{}", self.0)
    }

    /// The bridge joining the TAP interface to the container.
    pub fn bridge(&self) -> String {
        format!("br-{}", self.0)
    }

    /// The host side of the container's veth pair.
    pub fn veth_pair(&self) -> String {
        format!("{}-veth", self.0)
    }

    /// The file name of the rendered container configuration.
    pub fn config_file(&self) -> String {
        format!("lxc-{}.conf", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodeName {
    type Err = NodeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeName {
    type Error = NodeNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeName> for String {
    fn from(name: NodeName) -> Self {
        name.0
    }
}

/// Whether a node is one of the two fixed infrastructure nodes or a selected member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    Infrastructure,
    Member,
}

/// A node in the testbed.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct Node {
    pub name: NodeName,
    pub kind: NodeKind,
}

/// Error constructing a [`NodeName`].
#[derive(Debug, thiserror::Error)]
pub enum NodeNameError {
    /// The name is empty.
    #[error("node name is empty")]
    Empty,

    /// The name is too long for derived interface names.
    #[error("node name {0:?} is longer than {MAX_NAME_LEN} characters")]
    TooLong(String),

    /// The name contains characters that are not valid in interface names.
    #[error("node name {0:?} may only contain ASCII letters, digits and '_'")]
    InvalidChars(String),
}
