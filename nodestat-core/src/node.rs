//! Telemetry facade for one remote host
//!
//! [`Node`] ties a [`Session`] to a [`MetricSource`] and exposes one
//! accessor per metric, plus composite reads and the polling scheduler.
//!
//! Accessors check readiness before building any future, so a call on a
//! session that is not connected fails without contacting the host:
//!
//! ```ignore
//! let node = Node::new(config)?;
//! node.connect().await?;
//! let memory = node.memory()?.await?;
//! node.close().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::NodeConfig;
use crate::error::{ConfigResult, TelemetryResult};
use crate::metrics::{
    CpuTopology, CpuUsageSample, GpuReading, GpuRecord, MemoryInfo, MetricSource, NodeInfo,
    OsIdentity, Snapshot, UptimeInfo, source_for,
};
use crate::session::{Session, SessionState};
use crate::tracing::span_names;
use crate::transport::{OpenSshTransport, RemoteTransport};
use crate::watch::{self, WatchEvent, WatchHandle};

struct NodeInner {
    config: NodeConfig,
    session: Session,
    source: Arc<dyn MetricSource>,
}

/// Remote host telemetry over one persistent session
///
/// Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("session", &self.inner.session)
            .field("os_family", &self.inner.config.os_family)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Creates a node reaching `config.target` through OpenSSH
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::Invalid`] if the config fails
    /// validation.
    pub fn new(config: NodeConfig) -> ConfigResult<Self> {
        config.validate()?;
        let transport = Arc::new(OpenSshTransport::new(config.target.clone()));
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a node over any transport; the target in `config` is unused
    #[must_use]
    pub fn with_transport(config: NodeConfig, transport: Arc<dyn RemoteTransport>) -> Self {
        let source = source_for(config.os_family, config.gpu_query.clone());
        Self {
            inner: Arc::new(NodeInner {
                session: Session::new(transport),
                source,
                config,
            }),
        }
    }

    /// Configuration the node was built from
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Session lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Returns true when accessors may run
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.session.is_ready()
    }

    /// Opens the session
    ///
    /// # Errors
    ///
    /// See [`Session::connect`].
    pub async fn connect(&self) -> TelemetryResult<()> {
        self.inner.session.connect().await
    }

    /// Closes the session. Running watch loops end at their next check.
    ///
    /// # Errors
    ///
    /// See [`Session::close`].
    pub async fn close(&self) -> TelemetryResult<()> {
        self.inner.session.close().await
    }

    /// Hostname
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn hostname(
        &self,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<String>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.source.hostname(&self.inner.session))
    }

    /// Distribution identity
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn os(&self) -> TelemetryResult<impl Future<Output = TelemetryResult<OsIdentity>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.source.os(&self.inner.session))
    }

    /// Memory, swap and cache usage
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn memory(
        &self,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<MemoryInfo>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.source.memory(&self.inner.session))
    }

    /// Per-core CPU counters
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn cpu_usage(
        &self,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<CpuUsageSample>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.source.cpu_usage(&self.inner.session))
    }

    /// CPU topology
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn cpus(
        &self,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<CpuTopology>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.source.cpus(&self.inner.session))
    }

    /// GPU records; fails with `NoGpuAvailable` on hosts without one
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn gpus(
        &self,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<Vec<GpuRecord>>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.source.gpus(&self.inner.session))
    }

    /// Uptime and idle time
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn uptime(
        &self,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<UptimeInfo>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.source.uptime(&self.inner.session))
    }

    /// Runs an arbitrary command, returning trimmed stdout
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready.
    pub fn exec<'a>(
        &'a self,
        command: &'a str,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<String>> + Send + 'a> {
        self.inner.session.ensure_ready()?;
        Ok(self.inner.session.exec(command))
    }

    /// Hostname, memory, OS, CPU topology, uptime and GPUs.
    ///
    /// The first five are fetched concurrently and all must succeed. GPU
    /// failure degrades to [`GpuReading::Absent`].
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready. The
    /// future fails with the first error among the required fetches.
    pub fn info(&self) -> TelemetryResult<impl Future<Output = TelemetryResult<NodeInfo>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        let span = tracing::info_span!(span_names::NODE_INFO, host = %self.inner.session.describe());

        Ok(async move {
            let (session, source) = (&self.inner.session, &self.inner.source);
            let (hostname, memory, os, cpu, uptime) = tokio::join!(
                source.hostname(session),
                source.memory(session),
                source.os(session),
                source.cpus(session),
                source.uptime(session),
            );
            let (hostname, memory, os, cpu, uptime) = (hostname?, memory?, os?, cpu?, uptime?);

            let gpu = self.gpu_reading().await;

            Ok(NodeInfo {
                hostname,
                memory,
                os,
                cpu,
                uptime,
                gpu,
            })
        }
        .instrument(span))
    }

    /// GPU, CPU usage, memory and uptime, fetched concurrently.
    ///
    /// GPU failure degrades to [`GpuReading::Absent`].
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately unless the session is ready. The
    /// future fails with the first error among CPU, memory and uptime.
    pub fn snapshot(
        &self,
    ) -> TelemetryResult<impl Future<Output = TelemetryResult<Snapshot>> + Send + '_> {
        self.inner.session.ensure_ready()?;
        let span = tracing::debug_span!(span_names::NODE_SNAPSHOT, host = %self.inner.session.describe());

        Ok(async move {
            let (session, source) = (&self.inner.session, &self.inner.source);
            let (gpu, cpu, memory, uptime) = tokio::join!(
                self.gpu_reading(),
                source.cpu_usage(session),
                source.memory(session),
                source.uptime(session),
            );

            Ok(Snapshot {
                gpu,
                cpu: cpu?,
                memory: memory?,
                uptime: uptime?,
                taken_at: Utc::now(),
            })
        }
        .instrument(span))
    }

    /// Starts polling snapshots into `callback`.
    ///
    /// The first cycle waits `initial_delay` (the configured initial delay,
    /// then the interval, when `None`). Failed cycles skip the callback.
    /// The loop ends once the node is closed.
    pub fn watch_stats<F>(&self, callback: F, initial_delay: Option<Duration>) -> WatchHandle
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        watch::spawn_callback(self.clone(), self.first_delay(initial_delay), callback)
    }

    /// Starts polling snapshots into a channel. The loop also ends when the
    /// receiver is dropped.
    #[must_use]
    pub fn watch_events(
        &self,
        initial_delay: Option<Duration>,
    ) -> (WatchHandle, mpsc::Receiver<WatchEvent>) {
        watch::spawn_channel(self.clone(), self.first_delay(initial_delay))
    }

    fn first_delay(&self, initial_delay: Option<Duration>) -> Option<Duration> {
        initial_delay.or_else(|| self.inner.config.watch.initial_delay())
    }

    async fn gpu_reading(&self) -> GpuReading {
        match self.inner.source.gpus(&self.inner.session).await {
            Ok(devices) => GpuReading::Present { devices },
            Err(e) => {
                tracing::warn!(error = %e, "GPU query failed, reporting no GPU");
                GpuReading::Absent {
                    reason: e.to_string(),
                }
            }
        }
    }
}
