mod carsim;
mod cli;
mod tools;

use anyhow::Context;
use clap::Parser;
use testbed_utils::RunConfig;

use crate::cli::{Args, Command};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = match &args.command {
        Command::Carsim(carsim) if carsim.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &args.config {
        Some(path) => testbed_utils::read_run_config(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => RunConfig::default(),
    };
    match args.command {
        Command::Run { program } => tools::run(&program, &config),
        Command::Carsim(carsim) => carsim::carsim(carsim, config),
        Command::Save { repo, message } => {
            let repo = repo.unwrap_or_else(|| config.backup_repo.clone());
            tools::save(&repo, &message)
        }
    }
}
