//! Polling scheduler
//!
//! A watch task repeatedly sleeps, takes a [`Snapshot`] from a [`Node`] and
//! hands it to a sink: a callback ([`Node::watch_stats`]) or a channel
//! ([`Node::watch_events`]). The loop ends by itself once the node's session
//! stops being ready; closing the node is the only cancellation needed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::metrics::Snapshot;
use crate::node::Node;

/// Capacity of the [`Node::watch_events`] channel
const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Events emitted by [`Node::watch_events`]
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A cycle completed
    Snapshot(Snapshot),
    /// A cycle failed; the loop continues
    CycleFailed(String),
    /// The loop ended
    Stopped,
}

/// Handle to a running watch task
#[derive(Debug)]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Waits for the loop to end (after the node is closed, or the failure
    /// limit is reached)
    pub async fn join(self) {
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            tracing::error!("Watch task panicked: {e}");
        }
    }

    /// Stops the loop immediately, dropping any in-flight cycle
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Returns true once the loop has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Receives loop output; returning false ends the loop
#[async_trait]
trait WatchSink: Send {
    async fn deliver(&mut self, event: WatchEvent) -> bool;
}

struct CallbackSink<F>(F);

#[async_trait]
impl<F> WatchSink for CallbackSink<F>
where
    F: FnMut(Snapshot) + Send,
{
    async fn deliver(&mut self, event: WatchEvent) -> bool {
        if let WatchEvent::Snapshot(snapshot) = event {
            (self.0)(snapshot);
        }
        true
    }
}

struct ChannelSink(mpsc::Sender<WatchEvent>);

#[async_trait]
impl WatchSink for ChannelSink {
    async fn deliver(&mut self, event: WatchEvent) -> bool {
        self.0.send(event).await.is_ok()
    }
}

pub(crate) fn spawn_callback<F>(node: Node, initial_delay: Option<Duration>, callback: F) -> WatchHandle
where
    F: FnMut(Snapshot) + Send + 'static,
{
    WatchHandle {
        task: tokio::spawn(run(node, initial_delay, CallbackSink(callback))),
    }
}

pub(crate) fn spawn_channel(
    node: Node,
    initial_delay: Option<Duration>,
) -> (WatchHandle, mpsc::Receiver<WatchEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let handle = WatchHandle {
        task: tokio::spawn(run(node, initial_delay, ChannelSink(tx))),
    };
    (handle, rx)
}

async fn run(node: Node, initial_delay: Option<Duration>, mut sink: impl WatchSink) {
    let settings = &node.config().watch;
    let interval = settings.effective_interval();
    let max_failures = settings.max_consecutive_failures;

    let mut delay = initial_delay.unwrap_or(interval);
    let mut consecutive_failures: u32 = 0;

    tracing::debug!(
        interval_ms = interval.as_millis(),
        first_delay_ms = delay.as_millis(),
        "Watch started"
    );

    loop {
        tokio::time::sleep(delay).await;
        delay = interval;

        let Ok(pending) = node.snapshot() else {
            tracing::debug!("Session not ready, watch ending");
            break;
        };
        let result = pending.await;

        // Closed while the cycle was in flight
        if !node.is_ready() {
            tracing::debug!("Session closed during cycle, discarding sample");
            break;
        }

        match result {
            Ok(snapshot) => {
                consecutive_failures = 0;
                if !sink.deliver(WatchEvent::Snapshot(snapshot)).await {
                    return;
                }
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                tracing::warn!(
                    error = %e,
                    failures = consecutive_failures,
                    "Polling cycle failed, skipping"
                );
                if !sink.deliver(WatchEvent::CycleFailed(e.to_string())).await {
                    return;
                }
                if let Some(max) = max_failures
                    && consecutive_failures >= max
                {
                    tracing::warn!(
                        failures = consecutive_failures,
                        "Watch stopped after {max} consecutive failed cycles"
                    );
                    break;
                }
            }
        }
    }

    let _ = sink.deliver(WatchEvent::Stopped).await;
}
