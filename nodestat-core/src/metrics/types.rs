//! Data models for remote host telemetry
//!
//! All types are serializable so callers can forward them as JSON.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::gpu::GpuRecord;

/// Operating system family whose command dialect is used for collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Linux (`free`, `/proc/*`, `lscpu`, `lsb_release`)
    #[default]
    Linux,
}

/// Used/total pair in kilobytes, as reported by `free`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Total (KiB)
    pub total: u64,
    /// Used (KiB)
    pub used: u64,
}

impl MemoryUsage {
    /// Returns usage as a percentage (0.0–100.0)
    #[must_use]
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used as f32 / self.total as f32) * 100.0
    }
}

/// Memory, swap and buffer/cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Physical memory; used is total minus available
    pub memory: MemoryUsage,
    /// Swap space; used is total minus free
    pub swap: MemoryUsage,
    /// Legacy `-/+ buffers/cache` row, only printed by older `free`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<MemoryUsage>,
}

/// Raw counters of one CPU core from `/proc/stat` (jiffies since boot)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuCoreUsage {
    /// Core name, e.g. `cpu0`
    pub name: String,
    /// User time
    pub user: u64,
    /// Nice time
    pub nice: u64,
    /// System time
    pub system: u64,
    /// Idle time
    pub idle: u64,
    /// I/O wait time
    pub iowait: u64,
    /// Hardware interrupt time
    pub irq: u64,
    /// Software interrupt time
    pub softirq: u64,
}

impl CpuCoreUsage {
    /// Total jiffies across all tracked states
    #[must_use]
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
    }

    /// Total idle jiffies (idle + iowait)
    #[must_use]
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Calculates busy percentage between an earlier sample and this one
    #[must_use]
    pub fn busy_percent_since(&self, prev: &Self) -> f32 {
        let total_delta = self.total().saturating_sub(prev.total());
        if total_delta == 0 {
            return 0.0;
        }
        let idle_delta = self.idle_total().saturating_sub(prev.idle_total());
        let busy_delta = total_delta.saturating_sub(idle_delta);
        (busy_delta as f32 / total_delta as f32) * 100.0
    }
}

/// One `/proc/stat` sample: per-core counters in kernel order
pub type CpuUsageSample = Vec<CpuCoreUsage>;

/// Per-core busy percentages between two samples.
///
/// Cores are matched by name; cores missing from `prev` are skipped.
#[must_use]
pub fn core_busy_percents(prev: &[CpuCoreUsage], curr: &[CpuCoreUsage]) -> Vec<(String, f32)> {
    let previous: HashMap<&str, &CpuCoreUsage> =
        prev.iter().map(|core| (core.name.as_str(), core)).collect();

    curr.iter()
        .filter_map(|core| {
            previous
                .get(core.name.as_str())
                .map(|p| (core.name.clone(), core.busy_percent_since(p)))
        })
        .collect()
}

/// CPU topology from `lscpu`; static for the life of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTopology {
    /// Architecture, e.g. `x86_64`
    pub architecture: String,
    /// Vendor ID, e.g. `GenuineIntel`
    pub vendor: String,
    /// Model name
    pub model_name: String,
    /// Logical CPU count (`CPU(s)`)
    pub core_count: u32,
}

/// Distribution identity from `lsb_release` (or `/etc/os-release`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsIdentity {
    /// Distributor ID, e.g. `Ubuntu`
    pub id: String,
    /// Human readable description
    pub description: String,
    /// Release number
    pub release: String,
    /// Release codename
    pub codename: String,
}

/// Values from `/proc/uptime`, truncated to whole seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeInfo {
    /// Seconds since boot
    pub uptime_seconds: u64,
    /// Idle seconds summed over all CPUs
    pub idle_seconds: u64,
}

/// GPU telemetry that may be missing without invalidating the rest of a
/// snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GpuReading {
    /// Query succeeded; one record per device in enumeration order
    Present {
        /// Decoded device records
        devices: Vec<GpuRecord>,
    },
    /// Query failed; the host has no (NVIDIA) GPU or the tool is missing
    Absent {
        /// Why the query failed
        reason: String,
    },
}

impl GpuReading {
    /// Device records, empty when the reading is absent
    #[must_use]
    pub fn devices(&self) -> &[GpuRecord] {
        match self {
            Self::Present { devices } => devices,
            Self::Absent { .. } => &[],
        }
    }

    /// Returns true when the GPU query succeeded
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }
}

/// One polling cycle's worth of samples taken together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// GPU devices
    pub gpu: GpuReading,
    /// Per-core CPU counters
    pub cpu: CpuUsageSample,
    /// Memory usage
    pub memory: MemoryInfo,
    /// Uptime
    pub uptime: UptimeInfo,
    /// When the sample completed
    pub taken_at: DateTime<Utc>,
}

/// Full description of a host: static identity plus current usage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInfo {
    /// Hostname
    pub hostname: String,
    /// Memory usage
    pub memory: MemoryInfo,
    /// Distribution identity
    pub os: OsIdentity,
    /// CPU topology
    pub cpu: CpuTopology,
    /// Uptime
    pub uptime: UptimeInfo,
    /// GPU devices
    pub gpu: GpuReading,
}
