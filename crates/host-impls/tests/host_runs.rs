use host_impls::{IpRoute2, SystemShell};
use testbed_core::{BridgeManager, InterfaceManager};

#[test]
#[ignore = "needs root and the iproute2 tools"]
fn tap_and_bridge_round_trip() -> anyhow::Result<()> {
    let ip = IpRoute2::new(SystemShell::default());
    ip.create_interface("tap-itest")?;
    // Creating twice is fine.
    ip.create_interface("tap-itest")?;
    ip.create_bridge("br-itest", "tap-itest")?;
    let bridged = std::fs::read_link("/sys/class/net/tap-itest/master")?;
    assert!(bridged.ends_with("br-itest"));
    ip.destroy_bridge("br-itest", "tap-itest")?;
    ip.destroy_interface("tap-itest")?;
    // Destroying twice is fine.
    ip.destroy_interface("tap-itest")?;
    assert!(!std::path::Path::new("/sys/class/net/tap-itest").exists());
    Ok(())
}
