//! Command dialects: which command produces which metric
//!
//! A [`MetricSource`] pairs each metric with the remote command that
//! produces it and the parser that decodes it. [`source_for`] picks the
//! dialect for an [`OsFamily`].

use std::sync::Arc;

use async_trait::async_trait;

use super::gpu::{GpuQuerySchema, GpuRecord};
use super::parser::MetricsParser;
use super::types::{CpuTopology, CpuUsageSample, MemoryInfo, OsFamily, OsIdentity, UptimeInfo};
use crate::error::{OS_INFO_UNAVAILABLE, TelemetryError, TelemetryResult};
use crate::session::Session;

/// Prints the hostname
pub const HOSTNAME_COMMAND: &str = "hostname";
/// Prints memory and swap usage in KiB
pub const MEMORY_COMMAND: &str = "free";
/// Prints distributor ID, description, release and codename
pub const LSB_RELEASE_COMMAND: &str = "lsb_release -drci";
/// Fallback OS identity source when `lsb_release` is missing
pub const OS_RELEASE_COMMAND: &str = "cat /etc/os-release";
/// Prints per-core counters only; the aggregate `cpu` line has no digit
pub const CPU_USAGE_COMMAND: &str = "cat /proc/stat | grep 'cpu[0-9]'";
/// Prints CPU topology
pub const CPU_TOPOLOGY_COMMAND: &str = "lscpu";
/// Prints uptime and idle seconds
pub const UPTIME_COMMAND: &str = "cat /proc/uptime";

/// `nvidia-smi` prints this on stdout when the driver sees no device
const NO_DEVICES_MARKER: &str = "No devices were found";

/// Collects each metric from a [`Session`]
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Hostname
    async fn hostname(&self, session: &Session) -> TelemetryResult<String>;

    /// Memory, swap and cache usage
    async fn memory(&self, session: &Session) -> TelemetryResult<MemoryInfo>;

    /// Distribution identity
    async fn os(&self, session: &Session) -> TelemetryResult<OsIdentity>;

    /// Per-core CPU counters
    async fn cpu_usage(&self, session: &Session) -> TelemetryResult<CpuUsageSample>;

    /// CPU topology
    async fn cpus(&self, session: &Session) -> TelemetryResult<CpuTopology>;

    /// One record per GPU, in device order
    async fn gpus(&self, session: &Session) -> TelemetryResult<Vec<GpuRecord>>;

    /// Uptime and idle time
    async fn uptime(&self, session: &Session) -> TelemetryResult<UptimeInfo>;
}

/// Returns the metric source for `family`
#[must_use]
pub fn source_for(family: OsFamily, gpu_schema: GpuQuerySchema) -> Arc<dyn MetricSource> {
    match family {
        OsFamily::Linux => Arc::new(LinuxSource::new(gpu_schema)),
    }
}

/// Linux dialect: `free`, `/proc`, `lscpu`, `lsb_release`, `nvidia-smi`
#[derive(Debug, Clone, Default)]
pub struct LinuxSource {
    gpu_schema: GpuQuerySchema,
}

impl LinuxSource {
    /// Creates a source that queries GPUs with `gpu_schema`
    #[must_use]
    pub const fn new(gpu_schema: GpuQuerySchema) -> Self {
        Self { gpu_schema }
    }

    /// The GPU query schema in use
    #[must_use]
    pub const fn gpu_schema(&self) -> &GpuQuerySchema {
        &self.gpu_schema
    }
}

#[async_trait]
impl MetricSource for LinuxSource {
    async fn hostname(&self, session: &Session) -> TelemetryResult<String> {
        let output = session.exec(HOSTNAME_COMMAND).await?;
        MetricsParser::parse_hostname(&output)
    }

    async fn memory(&self, session: &Session) -> TelemetryResult<MemoryInfo> {
        let output = session.exec(MEMORY_COMMAND).await?;
        MetricsParser::parse_memory(&output)
    }

    async fn os(&self, session: &Session) -> TelemetryResult<OsIdentity> {
        match session.exec(LSB_RELEASE_COMMAND).await {
            Ok(output) => {
                if let Some(identity) = MetricsParser::parse_lsb_release(&output) {
                    return Ok(identity);
                }
                tracing::debug!("lsb_release output incomplete, trying /etc/os-release");
            }
            Err(e) if e.is_lifecycle() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "lsb_release failed, trying /etc/os-release"),
        }

        match session.exec(OS_RELEASE_COMMAND).await {
            Ok(output) => {
                if let Some(identity) = MetricsParser::parse_os_release(&output) {
                    return Ok(identity);
                }
            }
            Err(e) if e.is_lifecycle() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "/etc/os-release unreadable"),
        }

        Err(TelemetryError::parse(OS_INFO_UNAVAILABLE))
    }

    async fn cpu_usage(&self, session: &Session) -> TelemetryResult<CpuUsageSample> {
        let output = session.exec(CPU_USAGE_COMMAND).await?;
        MetricsParser::parse_cpu_usage(&output)
    }

    async fn cpus(&self, session: &Session) -> TelemetryResult<CpuTopology> {
        let output = session.exec(CPU_TOPOLOGY_COMMAND).await?;
        MetricsParser::parse_cpu_topology(&output)
    }

    async fn gpus(&self, session: &Session) -> TelemetryResult<Vec<GpuRecord>> {
        let output = match session.exec(&self.gpu_schema.command()).await {
            Ok(output) => output,
            Err(TelemetryError::CommandFailed(msg)) => {
                return Err(TelemetryError::NoGpuAvailable(msg));
            }
            Err(e) => return Err(e),
        };

        if output.starts_with(NO_DEVICES_MARKER) {
            return Err(TelemetryError::NoGpuAvailable(output));
        }

        self.gpu_schema.decode(&output)
    }

    async fn uptime(&self, session: &Session) -> TelemetryResult<UptimeInfo> {
        let output = session.exec(UPTIME_COMMAND).await?;
        MetricsParser::parse_uptime(&output)
    }
}
