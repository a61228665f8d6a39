use std::cell::RefCell;

use testbed_core::{HostError, HostResult};

use crate::command::{HostCommand, Shell};

/// A shell that records command lines. Commands registered with [`RecordingShell::fail`] are
/// refused.
#[derive(Debug, Default)]
pub(crate) struct RecordingShell {
    lines: RefCell<Vec<String>>,
    failing: RefCell<Vec<String>>,
}

impl RecordingShell {
    pub(crate) fn fail(&self, line: &str) {
        self.failing.borrow_mut().push(line.to_owned());
    }

    pub(crate) fn transcript(&self) -> String {
        self.lines
            .borrow()
            .iter()
            .map(|line| format!("{line}\n"))
            .collect()
    }
}

impl Shell for RecordingShell {
    fn run(&self, cmd: &HostCommand) -> HostResult {
        let line = cmd.to_string();
        self.lines.borrow_mut().push(line.clone());
        if self.failing.borrow().contains(&line) {
            return Err(HostError::Refused {
                command: line,
                reason: "Operation not permitted".to_owned(),
            });
        }
        Ok(())
    }
}
