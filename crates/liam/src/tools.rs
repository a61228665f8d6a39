use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;
use testbed_utils::RunConfig;

/// Launches a configured program, detached from the terminal.
pub(crate) fn run(name: &str, config: &RunConfig) -> anyhow::Result<()> {
    let program = config.programs.get(name).with_context(|| {
        let known = config
            .programs
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>();
        format!("unknown program `{name}` (known: {})", known.join(", "))
    })?;
    let dir = home_relative(&program.dir)?;
    log::info!("running {name}");
    Command::new("sh")
        .arg("-c")
        .arg(&program.command)
        .current_dir(&dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .with_context(|| format!("failed to launch {name} in {}", dir.display()))?;
    Ok(())
}

/// Commits every tracked change in the backup repository and pushes it.
pub(crate) fn save(repo: &Path, message: &str) -> anyhow::Result<()> {
    let repo = home_relative(repo)?;
    log::info!("saving {}", repo.display());
    cmd_lib::run_cmd! {
        cd ${repo};
        git commit -a -m ${message};
        git push
    }
    .with_context(|| format!("failed to save {}", repo.display()))?;
    Ok(())
}

fn home_relative(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let home = std::env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(path))
}
