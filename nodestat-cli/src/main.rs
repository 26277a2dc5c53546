//! `nodestat` CLI - remote host telemetry over SSH
//!
//! Opens one SSH session to a host, reads memory, CPU, GPU, uptime and OS
//! identity, and prints them as JSON or as a polling table.

mod cli;
mod commands;
mod error;
mod util;

use clap::Parser;
use cli::Cli;
use nodestat_core::{TracingConfig, TracingLevel, init_tracing};

use crate::util::TargetOverrides;

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        TracingLevel::Error
    } else {
        TracingLevel::from_verbosity(cli.verbose)
    };
    if let Err(e) = init_tracing(&TracingConfig::new().with_level(level)) {
        eprintln!("Warning: {e}");
    }

    let overrides = TargetOverrides {
        host: cli.host,
        port: cli.port,
        user: cli.user,
        identity: cli.identity,
        password: None,
    };

    let result = commands::dispatch(
        cli.config.as_deref(),
        overrides,
        cli.ask_password,
        cli.command,
    );

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e}");
        }
        std::process::exit(e.exit_code());
    }
}
