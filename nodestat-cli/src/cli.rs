//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Remote host telemetry over SSH
#[derive(Parser)]
#[command(name = "nodestat")]
#[command(author, version, about = "Remote host telemetry over a persistent SSH session")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (default: <config dir>/nodestat/config.toml)
    #[arg(short, long, global = true, env = "NODESTAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remote host; overrides the config file
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// SSH port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Login user
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Private key file
    #[arg(short, long, global = true)]
    pub identity: Option<String>,

    /// Prompt for an SSH password (requires sshpass)
    #[arg(long, global = true)]
    pub ask_password: bool,

    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Hostname, memory, OS, CPU, uptime and GPUs in one report
    #[command(about = "Show a full description of the host")]
    Info,

    /// Hostname
    Hostname,

    /// Distribution identity
    Os,

    /// Memory, swap and buffer/cache usage
    Memory,

    /// Raw per-core CPU counters
    CpuUsage,

    /// CPU topology
    Cpus,

    /// GPU devices
    Gpus,

    /// Uptime and idle time
    Uptime,

    /// Run a command on the host and print its output
    Exec {
        /// Command and arguments, passed to the remote shell as one line
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Poll snapshots at a fixed interval
    #[command(about = "Poll CPU, memory, uptime and GPU usage")]
    Watch {
        /// Polling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Delay before the first sample in milliseconds
        #[arg(long)]
        initial_delay_ms: Option<u64>,

        /// Stop after this many samples
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: WatchFormat,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output format for `watch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchFormat {
    /// One summary line per sample
    Table,
    /// One JSON object per line
    Json,
}
