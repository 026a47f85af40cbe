use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod queues;
pub mod simulate;
pub mod soak;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the VLAN tag to transmit queue and channel map.
    Queues(QueuesArgs),
    /// Replay a JSON scenario against an in-memory modem.
    Simulate(SimulateArgs),
    /// Run concurrent session churn against live traffic.
    Soak(SoakArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Queues(args) => queues::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Soak(args) => soak::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct QueuesArgs {
    /// Number of IP-capable sessions.
    #[arg(long, default_value = "8", env = "WWANMUX_MAX_SESSIONS")]
    pub max_sessions: usize,
    /// Only show these tags (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<u16>>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario file (JSON).
    pub scenario: PathBuf,
    /// Stop at the first failing step and exit with its error code.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct SoakArgs {
    /// Number of IP sessions to churn.
    #[arg(long, default_value = "8")]
    pub sessions: u16,
    /// Frames to transmit before stopping.
    #[arg(long, default_value = "10000")]
    pub frames: u64,
    /// Give up after this long (e.g. 30s, 500ms).
    #[arg(long, default_value = "60s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
