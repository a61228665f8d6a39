//! Containers via the LXC command-line tools.

use std::path::Path;
use std::time::Duration;

use testbed_core::{ContainerRuntime, HostResult, Image};

use crate::command::{HostCommand, Shell, SystemShell, Tolerate};

/// A [`ContainerRuntime`] backed by `lxc-create`, `lxc-start`, `lxc-stop` and `lxc-destroy`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lxc<S = SystemShell> {
    shell: S,
}

impl<S: Shell> Lxc<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }
}

impl<S: Shell> ContainerRuntime for Lxc<S> {
    fn create(&self, name: &str, config: &Path, image: &Image) -> HostResult {
        let config = config.display().to_string();
        self.shell.run(
            &HostCommand::new(
                "lxc-create",
                [
                    "-n",
                    name,
                    "-f",
                    config.as_str(),
                    "-t",
                    "download",
                    "--",
                    "-d",
                    image.dist.as_str(),
                    "-r",
                    image.release.as_str(),
                    "-a",
                    image.arch.as_str(),
                ],
            )
            .tolerate(Tolerate::Exists),
        )
    }

    fn start(&self, name: &str) -> HostResult {
        self.shell
            .run(&HostCommand::new("lxc-start", ["-n", name]).tolerate(Tolerate::Exists))
    }

    fn shutdown(&self, name: &str, grace: Duration) -> HostResult {
        let timeout = grace.as_secs().to_string();
        self.shell.run(
            &HostCommand::new("lxc-stop", ["-n", name, "--nokill", "-t", timeout.as_str()])
                .tolerate(Tolerate::Missing),
        )
    }

    fn kill(&self, name: &str) -> HostResult {
        self.shell.run(
            &HostCommand::new("lxc-stop", ["-n", name, "--kill"]).tolerate(Tolerate::Missing),
        )
    }

    fn destroy(&self, name: &str) -> HostResult {
        self.shell
            .run(&HostCommand::new("lxc-destroy", ["-n", name]).tolerate(Tolerate::Missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingShell;

    #[test]
    fn container_commands_correct() {
        let shell = RecordingShell::default();
        let lxc = Lxc::new(&shell);
        let conf = Path::new("/opt/cont_conf/lxc-n1c1.conf");
        lxc.create("n1c1", conf, &Image::default()).unwrap();
        lxc.start("n1c1").unwrap();
        lxc.shutdown("n1c1", Duration::from_secs(30)).unwrap();
        lxc.kill("n1c1").unwrap();
        lxc.destroy("n1c1").unwrap();
        insta::assert_snapshot!(shell.transcript(), @r###"
        lxc-create -n n1c1 -f /opt/cont_conf/lxc-n1c1.conf -t download -- -d fedora -r 31 -a amd64
        lxc-start -n n1c1
        lxc-stop -n n1c1 --nokill -t 30
        lxc-stop -n n1c1 --kill
        lxc-destroy -n n1c1
        "###);
    }
}
