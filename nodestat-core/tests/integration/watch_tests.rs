//! Polling scheduler tests, run on a paused tokio clock

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nodestat_core::metrics::MEMORY_COMMAND;
use nodestat_core::testing::{FREE_FIXTURE, MockTransport};
use nodestat_core::transport::ExecOutput;
use nodestat_core::{Node, NodeConfig, Snapshot, WatchEvent, WatchSettings};

fn node_with(mock: &Arc<MockTransport>, watch: WatchSettings) -> Node {
    let config = NodeConfig {
        watch,
        ..NodeConfig::default()
    };
    Node::with_transport(config, mock.clone())
}

fn collector() -> (Arc<Mutex<Vec<Snapshot>>>, impl FnMut(Snapshot) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |snapshot| sink.lock().unwrap().push(snapshot))
}

#[tokio::test(start_paused = true)]
async fn delivers_one_snapshot_per_interval() {
    let mock = Arc::new(MockTransport::linux_host());
    let node = node_with(&mock, WatchSettings::default());
    node.connect().await.unwrap();

    let (seen, callback) = collector();
    let handle = node.watch_stats(callback, None);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    node.close().await.unwrap();
    handle.join().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|s| s.cpu.len() == 4 && s.gpu.devices().len() == 2));
    assert!(seen.windows(2).all(|w| w[0].taken_at <= w[1].taken_at));
}

#[tokio::test(start_paused = true)]
async fn initial_delay_applies_to_first_cycle_only() {
    let mock = Arc::new(MockTransport::linux_host());
    let node = node_with(
        &mock,
        WatchSettings {
            interval_ms: 1000,
            ..WatchSettings::default()
        },
    );
    node.connect().await.unwrap();

    let (seen, callback) = collector();
    let handle = node.watch_stats(callback, Some(Duration::ZERO));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(seen.lock().unwrap().len(), 2);

    node.close().await.unwrap();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn watch_after_close_does_nothing() {
    let mock = Arc::new(MockTransport::linux_host());
    let node = node_with(&mock, WatchSettings::default());
    node.connect().await.unwrap();
    node.close().await.unwrap();

    let (seen, callback) = collector();
    let handle = node.watch_stats(callback, None);
    handle.join().await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(mock.exec_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_during_cycle_discards_the_sample() {
    let mock = Arc::new(MockTransport::linux_host().with_exec_delay(Duration::from_millis(500)));
    let node = node_with(&mock, WatchSettings::default());
    node.connect().await.unwrap();

    let (seen, callback) = collector();
    let handle = node.watch_stats(callback, Some(Duration::ZERO));

    // Cycle is in flight: commands were sent but have not answered yet
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(mock.exec_count() > 0);
    node.close().await.unwrap();

    handle.join().await;
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_skips_callback_and_loop_continues() {
    let mock = Arc::new(MockTransport::linux_host().with_failure(MEMORY_COMMAND, "free: not found"));
    let node = node_with(&mock, WatchSettings::default());
    node.connect().await.unwrap();

    let (seen, callback) = collector();
    let handle = node.watch_stats(callback, None);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(mock.count_of(MEMORY_COMMAND), 2);

    mock.set_output(MEMORY_COMMAND, ExecOutput::stdout(FREE_FIXTURE));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);

    node.close().await.unwrap();
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn events_stop_after_consecutive_failures() {
    let mock = Arc::new(MockTransport::linux_host().with_failure(MEMORY_COMMAND, "free: not found"));
    let node = node_with(
        &mock,
        WatchSettings {
            max_consecutive_failures: Some(2),
            ..WatchSettings::default()
        },
    );
    node.connect().await.unwrap();

    let (handle, mut events) = node.watch_events(None);

    assert!(matches!(events.recv().await, Some(WatchEvent::CycleFailed(ref m)) if m.contains("free")));
    assert!(matches!(events.recv().await, Some(WatchEvent::CycleFailed(_))));
    assert!(matches!(events.recv().await, Some(WatchEvent::Stopped)));
    assert!(events.recv().await.is_none());

    handle.join().await;
    assert!(node.is_ready());
}

#[tokio::test(start_paused = true)]
async fn events_end_with_stopped_after_close() {
    let mock = Arc::new(MockTransport::linux_host());
    let node = node_with(&mock, WatchSettings::default());
    node.connect().await.unwrap();

    let (handle, mut events) = node.watch_events(None);

    let Some(WatchEvent::Snapshot(first)) = events.recv().await else {
        panic!("expected a snapshot");
    };
    assert_eq!(first.uptime.uptime_seconds, 350_735);

    node.close().await.unwrap();
    assert!(matches!(events.recv().await, Some(WatchEvent::Stopped)));
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_receiver_ends_loop() {
    let mock = Arc::new(MockTransport::linux_host());
    let node = node_with(&mock, WatchSettings::default());
    node.connect().await.unwrap();

    let (handle, events) = node.watch_events(None);
    drop(events);

    handle.join().await;
    assert!(node.is_ready());
}
