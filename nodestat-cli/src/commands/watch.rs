//! Polling command: one line per snapshot until interrupted.

use std::fmt::Write as _;

use chrono::Local;
use nodestat_core::{CpuCoreUsage, GpuValue, Node, Snapshot, WatchEvent, core_busy_percents};

use crate::cli::WatchFormat;
use crate::error::CliError;

/// Options for `watch`
#[derive(Debug, Clone, Copy)]
pub struct WatchParams {
    /// Stop after this many samples
    pub count: Option<u64>,
    /// Output format
    pub format: WatchFormat,
}

/// Polls the node until `count` samples, Ctrl-C, or the loop gives up
pub async fn cmd_watch(node: &Node, params: WatchParams) -> Result<(), CliError> {
    let (handle, mut events) = node.watch_events(None);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut previous: Option<Vec<CpuCoreUsage>> = None;
    let mut samples: u64 = 0;
    let mut last_failure: Option<String> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(WatchEvent::Snapshot(snapshot)) => {
                    print_sample(&snapshot, previous.as_deref(), params.format)?;
                    previous = Some(snapshot.cpu);
                    samples += 1;
                    if params.count.is_some_and(|n| samples >= n) {
                        break;
                    }
                }
                Some(WatchEvent::CycleFailed(reason)) => last_failure = Some(reason),
                Some(WatchEvent::Stopped) | None => {
                    return Err(CliError::Command(format!(
                        "watch stopped: {}",
                        last_failure.unwrap_or_else(|| "session closed".to_string())
                    )));
                }
            },
            _ = &mut ctrl_c => break,
        }
    }

    node.close().await?;
    drop(events);
    handle.join().await;
    Ok(())
}

fn print_sample(
    snapshot: &Snapshot,
    previous: Option<&[CpuCoreUsage]>,
    format: WatchFormat,
) -> Result<(), CliError> {
    match format {
        WatchFormat::Table => println!("{}", table_row(snapshot, previous)),
        WatchFormat::Json => {
            let line =
                serde_json::to_string(snapshot).map_err(|e| CliError::Output(e.to_string()))?;
            println!("{line}");
        }
    }
    Ok(())
}

/// `12:00:01  cpu  23.5% (max  71.0%)  mem  38.1%  swap   0.0%  up 3d 04:05:06  gpu0 12% 45C`
fn table_row(snapshot: &Snapshot, previous: Option<&[CpuCoreUsage]>) -> String {
    let mut row = snapshot
        .taken_at
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string();

    let busy = previous
        .map(|prev| core_busy_percents(prev, &snapshot.cpu))
        .filter(|cores| !cores.is_empty());
    match busy {
        Some(cores) => {
            let avg = cores.iter().map(|(_, p)| p).sum::<f32>() / cores.len() as f32;
            let max = cores.iter().map(|(_, p)| *p).fold(0.0_f32, f32::max);
            let _ = write!(row, "  cpu {avg:5.1}% (max {max:5.1}%)");
        }
        None => row.push_str("  cpu     -             "),
    }

    let _ = write!(
        row,
        "  mem {:5.1}%  swap {:5.1}%  up {}",
        snapshot.memory.memory.percent(),
        snapshot.memory.swap.percent(),
        format_uptime(snapshot.uptime.uptime_seconds)
    );

    for (i, gpu) in snapshot.gpu.devices().iter().enumerate() {
        let index = gpu.get("index").and_then(GpuValue::as_int).unwrap_or(i as i64);
        let _ = write!(row, "  gpu{index}");
        if let Some(util) = gpu.get("utilization").and_then(GpuValue::as_int) {
            let _ = write!(row, " {util}%");
        }
        if let Some(temp) = gpu.get("temperature").and_then(GpuValue::as_int) {
            let _ = write!(row, " {temp}C");
        }
    }

    row
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nodestat_core::{GpuReading, MemoryInfo, MemoryUsage, UptimeInfo};

    fn core(name: &str, user: u64, idle: u64) -> CpuCoreUsage {
        CpuCoreUsage {
            name: name.to_string(),
            user,
            idle,
            ..CpuCoreUsage::default()
        }
    }

    fn snapshot(cpu: Vec<CpuCoreUsage>) -> Snapshot {
        Snapshot {
            gpu: GpuReading::Absent {
                reason: "none".into(),
            },
            cpu,
            memory: MemoryInfo {
                memory: MemoryUsage {
                    total: 1000,
                    used: 250,
                },
                swap: MemoryUsage::default(),
                cache: None,
            },
            uptime: UptimeInfo {
                uptime_seconds: 90_061,
                idle_seconds: 0,
            },
            taken_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "00:00:59");
        assert_eq!(format_uptime(3661), "01:01:01");
        assert_eq!(format_uptime(90_061), "1d 01:01:01");
    }

    #[test]
    fn test_first_row_has_no_cpu_percent() {
        let row = table_row(&snapshot(vec![core("cpu0", 10, 90)]), None);
        assert!(row.contains("cpu     -"));
        assert!(row.contains("mem  25.0%"));
        assert!(row.contains("up 1d 01:01:01"));
        assert!(!row.contains("gpu"));
    }

    #[test]
    fn test_row_uses_deltas_between_samples() {
        let prev = vec![core("cpu0", 0, 0), core("cpu1", 0, 0)];
        let curr = snapshot(vec![core("cpu0", 50, 50), core("cpu1", 0, 100)]);
        let row = table_row(&curr, Some(&prev));
        assert!(row.contains("cpu  25.0% (max  50.0%)"), "{row}");
    }
}
