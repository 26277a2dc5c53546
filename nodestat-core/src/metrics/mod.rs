//! Metric types, command output parsers and command dialects

mod gpu;
mod parser;
mod source;
mod types;

pub use gpu::{GpuField, GpuQuerySchema, GpuRecord, GpuValue, GpuValueType};
pub use parser::MetricsParser;
pub use source::{
    CPU_TOPOLOGY_COMMAND, CPU_USAGE_COMMAND, HOSTNAME_COMMAND, LSB_RELEASE_COMMAND, LinuxSource,
    MEMORY_COMMAND, MetricSource, OS_RELEASE_COMMAND, UPTIME_COMMAND, source_for,
};
pub use types::{
    CpuCoreUsage, CpuTopology, CpuUsageSample, GpuReading, MemoryInfo, MemoryUsage, NodeInfo,
    OsFamily, OsIdentity, Snapshot, UptimeInfo, core_busy_percents,
};
