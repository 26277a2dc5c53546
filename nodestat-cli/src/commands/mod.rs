//! Command handler modules for the CLI.

mod exec;
mod metric;
mod watch;

use std::path::Path;

use clap::CommandFactory;
use nodestat_core::{Node, NodeConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::util::{self, TargetOverrides};

pub use metric::MetricKind;
pub use watch::WatchParams;

/// Dispatch a CLI command to the appropriate handler.
pub fn dispatch(
    config_path: Option<&Path>,
    mut overrides: TargetOverrides,
    ask_password: bool,
    command: Commands,
) -> Result<(), CliError> {
    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "nodestat", &mut std::io::stdout());
        return Ok(());
    }

    if ask_password {
        overrides.password = Some(util::prompt_password()?);
    }
    let mut config = util::load_config(config_path, overrides)?;

    if let Commands::Watch {
        interval_ms,
        initial_delay_ms,
        ..
    } = &command
    {
        if let Some(ms) = interval_ms {
            config.watch.interval_ms = *ms;
        }
        if initial_delay_ms.is_some() {
            config.watch.initial_delay_ms = *initial_delay_ms;
        }
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Connection(format!("Failed to create async runtime: {e}")))?;

    runtime.block_on(run(config, command))
}

/// Connects, runs one command against the node and closes the session
async fn run(config: NodeConfig, command: Commands) -> Result<(), CliError> {
    let node = Node::new(config)?;
    node.connect().await?;

    let result = match command {
        Commands::Info => metric::cmd_metric(&node, MetricKind::Info).await,
        Commands::Hostname => metric::cmd_metric(&node, MetricKind::Hostname).await,
        Commands::Os => metric::cmd_metric(&node, MetricKind::Os).await,
        Commands::Memory => metric::cmd_metric(&node, MetricKind::Memory).await,
        Commands::CpuUsage => metric::cmd_metric(&node, MetricKind::CpuUsage).await,
        Commands::Cpus => metric::cmd_metric(&node, MetricKind::Cpus).await,
        Commands::Gpus => metric::cmd_metric(&node, MetricKind::Gpus).await,
        Commands::Uptime => metric::cmd_metric(&node, MetricKind::Uptime).await,
        Commands::Exec { command } => exec::cmd_exec(&node, &command.join(" ")).await,
        Commands::Watch { count, format, .. } => {
            watch::cmd_watch(&node, WatchParams { count, format }).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    if node.is_ready()
        && let Err(e) = node.close().await
    {
        tracing::warn!(error = %e, "Failed to close session");
    }

    result
}
