//! The cleanup stack. Every successfully provisioned resource is pushed here, and teardown is
//! derived from it, so only resources that actually exist are ever torn down.

use crate::node::NodeName;

/// A provisioned host resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Interface(String),
    Bridge { bridge: String, member: String },
    Container(NodeName),
}

/// One teardown action.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum TeardownStep {
    #[display(fmt = "stop container {}", _0)]
    StopContainer(NodeName),
    #[display(fmt = "destroy container {}", _0)]
    DestroyContainer(NodeName),
    #[display(fmt = "destroy bridge {}", bridge)]
    DestroyBridge { bridge: String, member: String },
    #[display(fmt = "destroy interface {}", _0)]
    DestroyInterface(String),
}

/// Resources in the order they were provisioned.
#[derive(Debug, Default)]
pub struct CleanupStack {
    entries: Vec<Resource>,
}

impl CleanupStack {
    pub fn push(&mut self, resource: Resource) {
        self.entries.push(resource);
    }

    /// Takes the teardown plan, leaving the stack empty.
    ///
    /// All containers are stopped before any is destroyed, then bridges go, then interfaces.
    /// Within each group resources are released in reverse provisioning order.
    pub fn take_plan(&mut self) -> Vec<TeardownStep> {
        let entries = std::mem::take(&mut self.entries);
        let containers = entries
            .iter()
            .rev()
            .filter_map(|r| match r {
                Resource::Container(name) => Some(name.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        let bridges = entries.iter().rev().filter_map(|r| match r {
            Resource::Bridge { bridge, member } => Some(TeardownStep::DestroyBridge {
                bridge: bridge.clone(),
                member: member.clone(),
            }),
            _ => None,
        });
        let interfaces = entries.iter().rev().filter_map(|r| match r {
            Resource::Interface(name) => Some(TeardownStep::DestroyInterface(name.clone())),
            _ => None,
        });
        containers
            .iter()
            .cloned()
            .map(TeardownStep::StopContainer)
            .chain(containers.iter().cloned().map(TeardownStep::DestroyContainer))
            .chain(bridges)
            .chain(interfaces)
            .collect()
    }

    delegate::delegate! {
        to self.entries {
            /// Returns the number of provisioned resources.
            pub fn len(&self) -> usize;

            /// Returns true if nothing is provisioned.
            pub fn is_empty(&self) -> bool;
        }
    }
}
