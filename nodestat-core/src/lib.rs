//! `nodestat` Core Library
//!
//! Collects hardware and OS telemetry (memory, CPU, GPU, uptime, OS
//! identity) from a remote host over one persistent SSH session.
//!
//! # Crate Structure
//!
//! - [`transport`] - Remote command channels (`OpenSSH` multiplexing)
//! - [`session`] - Session lifecycle and command execution
//! - [`metrics`] - Data models, output parsers and command dialects
//! - [`node`] - The [`Node`] facade: accessors, composites, polling
//! - [`watch`] - Polling scheduler
//! - [`config`] - TOML configuration
//! - [`testing`] - Scripted transport for tests

// Enable missing_docs warning for public API documentation
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod session;
pub mod testing;
pub mod tracing;
pub mod transport;
pub mod watch;

pub use config::{DEFAULT_INTERVAL_MS, MIN_INTERVAL_MS, NodeConfig, WatchSettings};
pub use error::{
    ConfigError, ConfigResult, OS_INFO_UNAVAILABLE, TelemetryError, TelemetryResult,
    TransportError, TransportResult,
};
pub use metrics::{
    CpuCoreUsage, CpuTopology, CpuUsageSample, GpuField, GpuQuerySchema, GpuReading, GpuRecord,
    GpuValue, GpuValueType, LinuxSource, MemoryInfo, MemoryUsage, MetricSource, MetricsParser,
    NodeInfo, OsFamily, OsIdentity, Snapshot, UptimeInfo, core_busy_percents, source_for,
};
pub use node::Node;
pub use session::{Session, SessionState};
pub use tracing::{
    TracingConfig, TracingError, TracingLevel, TracingOutput, TracingResult, init_tracing,
};
pub use transport::{ExecOutput, OpenSshTransport, RemoteTransport, SshTarget};
pub use watch::{WatchEvent, WatchHandle};
