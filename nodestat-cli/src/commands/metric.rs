//! Single-metric commands: fetch once, print as JSON.

use nodestat_core::Node;

use crate::error::CliError;
use crate::util::print_json;

/// Which metric to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Info,
    Hostname,
    Os,
    Memory,
    CpuUsage,
    Cpus,
    Gpus,
    Uptime,
}

/// Fetches one metric and prints it
pub async fn cmd_metric(node: &Node, kind: MetricKind) -> Result<(), CliError> {
    match kind {
        MetricKind::Info => print_json(&node.info()?.await?),
        MetricKind::Hostname => print_json(&node.hostname()?.await?),
        MetricKind::Os => print_json(&node.os()?.await?),
        MetricKind::Memory => print_json(&node.memory()?.await?),
        MetricKind::CpuUsage => print_json(&node.cpu_usage()?.await?),
        MetricKind::Cpus => print_json(&node.cpus()?.await?),
        MetricKind::Gpus => print_json(&node.gpus()?.await?),
        MetricKind::Uptime => print_json(&node.uptime()?.await?),
    }
}
