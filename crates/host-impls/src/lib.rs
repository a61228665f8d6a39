//! Linux implementations of the testbed's host traits: TAP interfaces and bridges through
//! iproute2, containers through the LXC tools.

#![warn(unreachable_pub, missing_debug_implementations)]

pub mod command;
pub mod iproute;
pub mod lxc;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{HostCommand, Shell, SystemShell, Tolerate};
pub use iproute::IpRoute2;
pub use lxc::Lxc;
