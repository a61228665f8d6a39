//! Running privileged host commands and classifying their failures.

use std::fmt;
use std::process::Command;

use testbed_core::{HostError, HostResult};

/// Which failure, if any, a command is allowed to end in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Tolerate {
    #[default]
    Nothing,
    /// The object being created is already there.
    Exists,
    /// The object being removed is already gone.
    Missing,
}

/// A single host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: &'static str,
    pub args: Vec<String>,
    pub tolerate: Tolerate,
}

impl HostCommand {
    pub fn new<A>(program: &'static str, args: A) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            program,
            args: args.into_iter().map(Into::into).collect(),
            tolerate: Tolerate::Nothing,
        }
    }

    pub fn tolerate(mut self, tolerate: Tolerate) -> Self {
        self.tolerate = tolerate;
        self
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Something that can run host commands.
pub trait Shell {
    fn run(&self, cmd: &HostCommand) -> HostResult;

    /// Runs every command, even after a failure, and returns the first error.
    fn run_each(&self, cmds: &[HostCommand]) -> HostResult {
        let mut first = None;
        for cmd in cmds {
            if let Err(e) = self.run(cmd) {
                log::warn!("{e}");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<T: Shell> Shell for &T {
    fn run(&self, cmd: &HostCommand) -> HostResult {
        (*self).run(cmd)
    }
}

/// Runs commands on the local host, through non-interactive `sudo` unless disabled.
#[derive(Debug, Clone, Copy, typed_builder::TypedBuilder)]
pub struct SystemShell {
    #[builder(default = true)]
    sudo: bool,
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Shell for SystemShell {
    fn run(&self, cmd: &HostCommand) -> HostResult {
        let command = cmd.to_string();
        log::debug!("{}{command}", if self.sudo { "sudo " } else { "" });
        let mut process = if self.sudo {
            let mut p = Command::new("sudo");
            p.arg("-n").arg(cmd.program);
            p
        } else {
            Command::new(cmd.program)
        };
        let output = process
            .args(&cmd.args)
            .output()
            .map_err(|source| HostError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        let reason = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        match (classify(&reason), cmd.tolerate) {
            (Failure::Refused, _) => Err(HostError::Refused { command, reason }),
            (Failure::Exists, Tolerate::Exists) | (Failure::Missing, Tolerate::Missing) => {
                log::debug!("`{command}`: {reason}, continuing");
                Ok(())
            }
            _ => Err(HostError::Failed {
                command,
                status: output.status.to_string(),
                reason,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    Refused,
    Exists,
    Missing,
    Other,
}

pub(crate) fn classify(stderr: &str) -> Failure {
    const REFUSED: &[&str] = &[
        "operation not permitted",
        "permission denied",
        "a password is required",
        "not in the sudoers",
        "must be run as root",
    ];
    const EXISTS: &[&str] = &["file exists", "already exists", "already running"];
    const MISSING: &[&str] = &[
        "cannot find device",
        "no such device",
        "does not exist",
        "not defined",
        "is not running",
    ];
    let stderr = stderr.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| stderr.contains(n));
    if any(REFUSED) {
        Failure::Refused
    } else if any(EXISTS) {
        Failure::Exists
    } else if any(MISSING) {
        Failure::Missing
    } else {
        Failure::Other
    }
}
