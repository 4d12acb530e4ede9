use structopt::StructOpt;

use shopsim::utils::Result;

use crate::commands;

#[derive(Debug, StructOpt)]
#[structopt(name = "shopsim", about = "Discrete-event job-shop simulator")]
pub struct Opt {
    /// Set a custom config file
    #[structopt(short, long, parse(from_os_str))]
    pub config: Option<std::path::PathBuf>,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Run the built-in demo scenario and write its traces/results
    Run,
    /// Show the resolved configuration
    Config,
}

/// Parses arguments, merges a `--config` override, and dispatches to a
/// subcommand.
pub fn execute() -> Result<()> {
    let opt = Opt::from_args();

    shopsim::utils::AppConfig::merge_config(opt.config.as_deref().and_then(|p| p.to_str()))?;

    match opt.command {
        Command::Run => commands::run(),
        Command::Config => commands::config(),
    }
}
