use argh::FromArgs;
use log::LevelFilter;
use std::path::PathBuf;

/// Onboards the Knox gateway onto an Ambari cluster.
#[derive(FromArgs, Debug)]
pub(crate) struct Arguments {
    /// path to the TOML config file [default: /etc/knoxdog.toml]
    #[argh(option, short = 'c')]
    pub(crate) config: Option<PathBuf>,
    /// logging verbosity [trace|debug|info|warn|error]
    #[argh(option, short = 'l', default = "LevelFilter::Info")]
    pub(crate) log_level: LevelFilter,
    #[argh(subcommand)]
    pub(crate) command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub(crate) enum Command {
    CheckKnox(CheckKnox),
    Whitelist(Whitelist),
    Topology(Topology),
    Setup(Setup),
}

/// Report whether the gateway service is installed.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "check-knox")]
pub(crate) struct CheckKnox {}

/// Print the inferred dispatch whitelist without publishing it.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "whitelist")]
pub(crate) struct Whitelist {}

/// Render the topology descriptor to stdout without publishing it.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "topology")]
pub(crate) struct Topology {}

/// Run the full onboarding sequence.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "setup")]
pub(crate) struct Setup {}
