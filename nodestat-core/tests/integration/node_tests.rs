//! End-to-end tests of the `Node` facade

use std::sync::Arc;

use nodestat_core::metrics::{
    CPU_TOPOLOGY_COMMAND, HOSTNAME_COMMAND, LSB_RELEASE_COMMAND, MEMORY_COMMAND, UPTIME_COMMAND,
};
use nodestat_core::testing::MockTransport;
use nodestat_core::{
    GpuField, GpuQuerySchema, GpuReading, GpuValue, GpuValueType, Node, NodeConfig, SessionState,
    TelemetryError,
};

fn linux_node() -> (Arc<MockTransport>, Node) {
    let mock = Arc::new(MockTransport::linux_host());
    let node = Node::with_transport(NodeConfig::default(), mock.clone());
    (mock, node)
}

#[tokio::test]
async fn info_decodes_every_metric() {
    let (mock, node) = linux_node();
    node.connect().await.unwrap();

    let info = node.info().unwrap().await.unwrap();

    assert_eq!(info.hostname, "gpu-node-01");

    assert_eq!(info.memory.memory.total, 16_318_480);
    assert_eq!(info.memory.memory.used, 16_318_480 - 10_138_200);
    assert_eq!(info.memory.swap.total, 2_097_148);
    assert_eq!(info.memory.swap.used, 2_097_148 - 1_572_860);

    assert_eq!(info.os.id, "Ubuntu");
    assert_eq!(info.os.description, "Ubuntu 22.04.4 LTS");
    assert_eq!(info.os.release, "22.04");
    assert_eq!(info.os.codename, "jammy");

    assert_eq!(info.cpu.architecture, "x86_64");
    assert_eq!(info.cpu.vendor, "GenuineIntel");
    assert_eq!(info.cpu.core_count, 4);

    assert_eq!(info.uptime.uptime_seconds, 350_735);
    assert_eq!(info.uptime.idle_seconds, 1_234_388);

    let gpus = info.gpu.devices();
    assert_eq!(gpus.len(), 2);
    assert_eq!(
        gpus[0].get("name").and_then(GpuValue::as_str),
        Some("NVIDIA GeForce RTX 3090")
    );
    assert_eq!(gpus[0].get("temperature"), Some(&GpuValue::Int(45)));
    assert_eq!(gpus[0].get("usedMemory"), Some(&GpuValue::Int(1024)));
    assert_eq!(gpus[1].get("totalMemory"), Some(&GpuValue::Int(24_576)));

    for command in [
        HOSTNAME_COMMAND,
        MEMORY_COMMAND,
        LSB_RELEASE_COMMAND,
        CPU_TOPOLOGY_COMMAND,
        UPTIME_COMMAND,
    ] {
        assert_eq!(mock.count_of(command), 1, "{command}");
    }
    assert_eq!(mock.count_of(&GpuQuerySchema::default().command()), 1);
}

#[tokio::test]
async fn info_degrades_when_gpu_query_fails() {
    let mock = Arc::new(MockTransport::linux_host().with_failure(
        &GpuQuerySchema::default().command(),
        "bash: nvidia-smi: command not found",
    ));
    let node = Node::with_transport(NodeConfig::default(), mock);
    node.connect().await.unwrap();

    let info = node.info().unwrap().await.unwrap();

    assert_eq!(info.hostname, "gpu-node-01");
    assert!(!info.gpu.is_present());
    assert!(info.gpu.devices().is_empty());
    assert!(matches!(info.gpu, GpuReading::Absent { ref reason } if reason.contains("nvidia-smi")));
}

#[tokio::test]
async fn info_fails_when_a_required_metric_fails() {
    let mock = Arc::new(
        MockTransport::linux_host().with_failure(CPU_TOPOLOGY_COMMAND, "lscpu: command not found"),
    );
    let node = Node::with_transport(NodeConfig::default(), mock.clone());
    node.connect().await.unwrap();

    let err = node.info().unwrap().await.unwrap_err();
    assert!(matches!(err, TelemetryError::CommandFailed(ref m) if m.contains("lscpu")));
    // Sibling fetches still ran to completion
    assert_eq!(mock.count_of(HOSTNAME_COMMAND), 1);
    assert_eq!(mock.count_of(UPTIME_COMMAND), 1);
}

#[tokio::test]
async fn accessors_before_connect_send_nothing() {
    let (mock, node) = linux_node();

    assert!(matches!(node.hostname(), Err(TelemetryError::NotConnected)));
    assert!(matches!(node.os(), Err(TelemetryError::NotConnected)));
    assert!(matches!(node.memory(), Err(TelemetryError::NotConnected)));
    assert!(matches!(node.cpu_usage(), Err(TelemetryError::NotConnected)));
    assert!(matches!(node.cpus(), Err(TelemetryError::NotConnected)));
    assert!(matches!(node.gpus(), Err(TelemetryError::NotConnected)));
    assert!(matches!(node.uptime(), Err(TelemetryError::NotConnected)));
    assert!(matches!(node.info(), Err(TelemetryError::NotConnected)));

    assert_eq!(mock.exec_count(), 0);
}

#[tokio::test]
async fn accessors_after_close_send_nothing() {
    let (mock, node) = linux_node();
    node.connect().await.unwrap();
    node.close().await.unwrap();

    assert_eq!(node.state(), SessionState::Closed);
    assert!(matches!(node.snapshot(), Err(TelemetryError::NotConnected)));
    assert_eq!(mock.exec_count(), 0);
}

#[tokio::test]
async fn failed_connect_can_be_retried() {
    let mock = Arc::new(MockTransport::linux_host().failing_connect("Connection refused"));
    let node = Node::with_transport(NodeConfig::default(), mock.clone());

    assert!(matches!(
        node.connect().await,
        Err(TelemetryError::ConnectFailed(_))
    ));
    assert_eq!(node.state(), SessionState::Disconnected);

    mock.set_connect_failure(None);
    node.connect().await.unwrap();
    assert_eq!(node.hostname().unwrap().await.unwrap(), "gpu-node-01");
}

#[tokio::test]
async fn custom_gpu_schema_drives_query_and_keys() {
    let schema = GpuQuerySchema::new(vec![
        GpuField::new("index", "index", GpuValueType::Int),
        GpuField::new("power.draw", "power", GpuValueType::Float),
        GpuField::new("fan.speed", "fan", GpuValueType::Int),
    ])
    .unwrap();
    assert_eq!(
        schema.command(),
        "nvidia-smi --query-gpu=index,power.draw,fan.speed --format=csv,noheader,nounits"
    );

    let mock = Arc::new(
        MockTransport::linux_host().with_response(&schema.command(), "0, 231.45, [N/A]\n"),
    );
    let config = NodeConfig {
        gpu_query: schema,
        ..NodeConfig::default()
    };
    let node = Node::with_transport(config, mock);
    node.connect().await.unwrap();

    let gpus = node.gpus().unwrap().await.unwrap();
    assert_eq!(gpus.len(), 1);
    assert_eq!(gpus[0].keys().collect::<Vec<_>>(), ["index", "power", "fan"]);
    assert_eq!(gpus[0].get("power"), Some(&GpuValue::Float(231.45)));
    assert_eq!(gpus[0].get("fan"), Some(&GpuValue::Unavailable));
}

#[tokio::test]
async fn snapshot_serializes_to_json() {
    let (_mock, node) = linux_node();
    node.connect().await.unwrap();

    let snapshot = node.snapshot().unwrap().await.unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["gpu"]["status"], "present");
    assert_eq!(json["gpu"]["devices"][1]["index"], 1);
    assert_eq!(json["cpu"][0]["name"], "cpu0");
    assert_eq!(json["memory"]["memory"]["total"], 16_318_480);
    assert!(json["taken_at"].is_string());
}
