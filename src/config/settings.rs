//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ServerCheck - hardware acceptance-test harness for server commissioning
#[derive(Parser, Debug, Clone)]
#[command(name = "servercheck")]
#[command(author = "ServerCheck Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate installed hardware against a declared expectation model")]
#[command(long_about = r#"
ServerCheck is a one-shot acceptance-test harness run at server commissioning
time. It collects ground-truth hardware facts from diagnostic tools, compares
them against a declarative expectation file, and write/read/verifies the
target storage devices.

Examples:
  servercheck check                       # Full validation pass
  servercheck check -c racks/a113.yaml    # Explicit expectation file
  servercheck mount                       # Provision test mount points
  servercheck status                      # Show target drive mount state
  servercheck unmount                     # Tear down test mount points
"#)]
pub struct CliArgs {
    /// Path to the expectation file (YAML)
    #[arg(short = 'c', long, default_value = "config.yaml", value_name = "PATH")]
    pub config: PathBuf,

    /// Override the per-tool timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub tool_timeout_secs: Option<u64>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the full validation pass (default when no subcommand is given)
    #[command(name = "check")]
    Check {
        /// Limit the pass to the named categories (cpu, memory, gpu, nic, disk, fans)
        #[arg(long, value_name = "CATEGORY")]
        only: Vec<String>,

        /// Skip the disk write test even if the expectation file enables it
        #[arg(long)]
        no_write_test: bool,
    },

    /// Discover target drives, format bare ones, and mount them for testing
    #[command(name = "mount")]
    Mount,

    /// Unmount all test mount points
    #[command(name = "unmount")]
    Unmount,

    /// Report discovery and mount state of target drives without side effects
    #[command(name = "status")]
    Status,
}
