//! TAP interfaces and bridges via iproute2.

use testbed_core::{BridgeManager, HostResult, InterfaceManager};

use crate::command::{HostCommand, Shell, SystemShell, Tolerate};

/// An [`InterfaceManager`] and [`BridgeManager`] backed by the `ip` tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpRoute2<S = SystemShell> {
    shell: S,
}

impl<S: Shell> IpRoute2<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }
}

impl<S: Shell> InterfaceManager for IpRoute2<S> {
    fn create_interface(&self, name: &str) -> HostResult {
        self.shell.run(
            &HostCommand::new("ip", ["tuntap", "add", "dev", name, "mode", "tap"])
                .tolerate(Tolerate::Exists),
        )?;
        // The interface carries no address of its own: its traffic belongs to the container on
        // the other side of the bridge.
        let configure = [
            HostCommand::new("ip", ["addr", "flush", "dev", name]),
            HostCommand::new("ip", ["link", "set", "dev", name, "promisc", "on", "up"]),
        ];
        for cmd in &configure {
            if let Err(e) = self.shell.run(cmd) {
                let _ = self.destroy_interface(name);
                return Err(e);
            }
        }
        Ok(())
    }

    fn destroy_interface(&self, name: &str) -> HostResult {
        self.shell.run_each(&[
            HostCommand::new("ip", ["link", "set", "dev", name, "down"])
                .tolerate(Tolerate::Missing),
            HostCommand::new("ip", ["tuntap", "del", "dev", name, "mode", "tap"])
                .tolerate(Tolerate::Missing),
        ])
    }
}

impl<S: Shell> BridgeManager for IpRoute2<S> {
    fn create_bridge(&self, bridge: &str, member: &str) -> HostResult {
        self.shell.run(
            &HostCommand::new("ip", ["link", "add", "name", bridge, "type", "bridge"])
                .tolerate(Tolerate::Exists),
        )?;
        let configure = [
            HostCommand::new("ip", ["link", "set", "dev", member, "master", bridge]),
            HostCommand::new("ip", ["link", "set", "dev", bridge, "up"]),
        ];
        for cmd in &configure {
            if let Err(e) = self.shell.run(cmd) {
                let _ = self.destroy_bridge(bridge, member);
                return Err(e);
            }
        }
        Ok(())
    }

    fn destroy_bridge(&self, bridge: &str, member: &str) -> HostResult {
        self.shell.run_each(&[
            HostCommand::new("ip", ["link", "set", "dev", bridge, "down"])
                .tolerate(Tolerate::Missing),
            HostCommand::new("ip", ["link", "set", "dev", member, "nomaster"])
                .tolerate(Tolerate::Missing),
            HostCommand::new("ip", ["link", "delete", "dev", bridge, "type", "bridge"])
                .tolerate(Tolerate::Missing),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingShell;

    #[test]
    fn interface_commands_correct() {
        let shell = RecordingShell::default();
        let ip = IpRoute2::new(&shell);
        ip.create_interface("tap-n1c1").unwrap();
        ip.destroy_interface("tap-n1c1").unwrap();
        insta::assert_snapshot!(shell.transcript(), @r###"
        ip tuntap add dev tap-n1c1 mode tap
        ip addr flush dev tap-n1c1
        ip link set dev tap-n1c1 promisc on up
        ip link set dev tap-n1c1 down
        ip tuntap del dev tap-n1c1 mode tap
        "###);
    }

    #[test]
    fn bridge_commands_correct() {
        let shell = RecordingShell::default();
        let ip = IpRoute2::new(&shell);
        ip.create_bridge("br-dc", "tap-dc").unwrap();
        ip.destroy_bridge("br-dc", "tap-dc").unwrap();
        insta::assert_snapshot!(shell.transcript(), @r###"
        ip link add name br-dc type bridge
        ip link set dev tap-dc master br-dc
        ip link set dev br-dc up
        ip link set dev br-dc down
        ip link set dev tap-dc nomaster
        ip link delete dev br-dc type bridge
        "###);
    }

    #[test]
    fn partial_interface_is_rolled_back() {
        let shell = RecordingShell::default();
        shell.fail("ip link set dev tap-dc promisc on up");
        let ip = IpRoute2::new(&shell);
        assert!(ip.create_interface("tap-dc").is_err());
        let transcript = shell.transcript();
        assert!(transcript.ends_with("ip tuntap del dev tap-dc mode tap\n"));
    }

    #[test]
    fn teardown_continues_past_failures() {
        let shell = RecordingShell::default();
        shell.fail("ip link set dev tap-dc nomaster");
        let ip = IpRoute2::new(&shell);
        assert!(ip.destroy_bridge("br-dc", "tap-dc").is_err());
        assert!(shell
            .transcript()
            .contains("ip link delete dev br-dc type bridge"));
    }
}
