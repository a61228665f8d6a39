//! This module defines the [`NodeSet`], the immutable set of nodes a testbed run provisions,
//! and the rules for resolving it from a [`NodeSelection`].

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::node::{Node, NodeKind, NodeName};

/// Which member nodes to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelection {
    /// An explicit, ordered subset of nodes.
    Explicit(Vec<NodeName>),
    /// The whole fleet, generated from a rule.
    Fleet(FleetRule),
}

impl NodeSelection {
    /// An explicit list wins over the fleet rule unless it is empty.
    pub fn new(explicit: Vec<NodeName>, fleet: FleetRule) -> Self {
        if explicit.is_empty() {
            Self::Fleet(fleet)
        } else {
            Self::Explicit(explicit)
        }
    }
}

/// The fleet-generation rule: nodes `1..=size`, each with two car interfaces except the ones
/// listed in `single_interface`, which only get their first.
#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct FleetRule {
    /// Number of fleet nodes.
    #[builder(default = 16)]
    pub size: usize,
    /// Fleet indices that carry a single car interface.
    #[builder(default = vec![9, 12])]
    pub single_interface: Vec<usize>,
}

impl Default for FleetRule {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FleetRule {
    /// The largest fleet whose member names fit [`MAX_NAME_LEN`](crate::node::MAX_NAME_LEN).
    pub const MAX_SIZE: usize = 9_999_999;

    /// Checks the fleet size without generating any names.
    pub fn validate(&self) -> Result<(), NodeSetError> {
        if self.size > Self::MAX_SIZE {
            return Err(NodeSetError::FleetTooLarge(self.size));
        }
        Ok(())
    }

    /// The number of members, computed without generating them.
    pub fn nr_members(&self) -> usize {
        let single = self
            .single_interface
            .iter()
            .filter(|&&i| (1..=self.size).contains(&i))
            .collect::<HashSet<_>>()
            .len();
        self.size.saturating_mul(2) - single
    }

    /// The member names in fleet order.
    pub fn iter_members(&self) -> impl Iterator<Item = NodeName> + '_ {
        (1..=self.size).flat_map(move |i| {
            let second = (!self.single_interface.contains(&i)).then(|| NodeName::fleet(i, 2));
            std::iter::once(NodeName::fleet(i, 1)).chain(second)
        })
    }

    /// Generates the member names in fleet order.
    pub fn members(&self) -> Vec<NodeName> {
        self.iter_members().collect()
    }
}

/// How the simulator should model the mobile nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelScope {
    /// Model only the nodes listed in the node-selection file.
    Subset,
    /// Model a fleet of `size` nodes.
    Fleet { size: usize },
}

/// The resolved set of nodes for one run. The two infrastructure nodes come first, followed by
/// the members in selection order.
#[derive(Debug, Clone)]
pub struct NodeSet {
    nodes: Vec<Node>,
    scope: ModelScope,
}

impl NodeSet {
    /// Resolves a selection into a node set.
    ///
    /// Correctness properties:
    ///
    /// - Every node name is unique, including the infrastructure nodes.
    /// - An explicit selection names at least one node.
    /// - A fleet is no larger than [`FleetRule::MAX_SIZE`].
    pub fn resolve(selection: &NodeSelection) -> Result<Self, NodeSetError> {
        let (members, scope) = match selection {
            NodeSelection::Explicit(names) => {
                if names.is_empty() {
                    return Err(NodeSetError::EmptySelection);
                }
                (names.clone(), ModelScope::Subset)
            }
            NodeSelection::Fleet(rule) => {
                rule.validate()?;
                (rule.members(), ModelScope::Fleet { size: rule.size })
            }
        };
        let infrastructure = [NodeName::data_centre(), NodeName::control_car()]
            .into_iter()
            .map(|name| Node::new(name, NodeKind::Infrastructure));
        let members = members
            .into_iter()
            .map(|name| Node::new(name, NodeKind::Member));
        let nodes = infrastructure.chain(members).collect::<Vec<_>>();
        let mut seen = HashSet::new();
        for node in &nodes {
            // CORRECTNESS: Every node name must be unique.
            if !seen.insert(&node.name) {
                return Err(NodeSetError::DuplicateNode(node.name.clone()));
            }
        }
        Ok(Self { nodes, scope })
    }

    /// All nodes in provisioning order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter()
    }

    /// The member nodes in selection order.
    pub fn members(&self) -> impl Iterator<Item = &NodeName> + '_ {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Member)
            .map(|n| &n.name)
    }

    pub fn scope(&self) -> ModelScope {
        self.scope
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self.scope, ModelScope::Subset)
    }

    delegate::delegate! {
        to self.nodes {
            /// Returns the number of nodes, infrastructure included.
            pub fn len(&self) -> usize;

            /// Returns true if there are no nodes.
            pub fn is_empty(&self) -> bool;
        }
    }
}

/// Renders the node-selection file read by the simulator: one member name per line.
pub fn render_node_selection(nodes: &NodeSet) -> String {
    nodes.members().map(|name| format!("{name}\n")).collect()
}

/// Writes the node-selection file, replacing any previous one.
pub fn write_node_selection(path: &Path, nodes: &NodeSet) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_node_selection(nodes))
}

/// Error resolving a [`NodeSet`].
#[derive(Debug, thiserror::Error)]
pub enum NodeSetError {
    /// Two nodes share a name.
    #[error("node {0} is selected more than once (or clashes with an infrastructure node)")]
    DuplicateNode(NodeName),

    /// An explicit selection is empty.
    #[error("explicit node selection is empty")]
    EmptySelection,

    /// The fleet is too large for its member names to fit interface names.
    #[error("fleet of {0} nodes is too large (at most {max})", max = FleetRule::MAX_SIZE)]
    FleetTooLarge(usize),
}
