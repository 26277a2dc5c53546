//! Parsers for Linux command output
//!
//! Each function takes the trimmed stdout of one command and decodes it
//! with a fixed grammar. Parsing is pure; command execution lives in
//! [`super::source`].

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::types::{CpuCoreUsage, CpuTopology, MemoryInfo, MemoryUsage, OsIdentity, UptimeInfo};
use crate::error::{TelemetryError, TelemetryResult};

/// Matches per-core lines of `/proc/stat` (`cpu0`, `cpu17`, ...), not the
/// aggregate `cpu` line
static CORE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cpu\d+$").expect("CORE_NAME_REGEX is a valid regex pattern"));

/// Minimum tokens on a per-core line: name plus counters up to softirq
const CPU_LINE_MIN_FIELDS: usize = 9;

/// Stateless parser for remote command output
pub struct MetricsParser;

impl MetricsParser {
    /// Parses `hostname` output.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ParseFailed`] if the output is blank.
    pub fn parse_hostname(output: &str) -> TelemetryResult<String> {
        let hostname = output.lines().next().unwrap_or("").trim();
        if hostname.is_empty() {
            return Err(TelemetryError::parse("empty hostname output"));
        }
        Ok(hostname.to_string())
    }

    /// Parses `free` output.
    ///
    /// ```text
    ///                total        used        free      shared  buff/cache   available
    /// Mem:        16318480     5043712     6453308      812220     4821460    10138200
    /// Swap:        2097148           0     2097148
    /// ```
    ///
    /// Older `free` versions add a `-/+ buffers/cache:` row, which fills
    /// [`MemoryInfo::cache`].
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ParseFailed`] if the `Mem:` row is missing
    /// or a matched row has missing or non-numeric columns.
    pub fn parse_memory(output: &str) -> TelemetryResult<MemoryInfo> {
        let mut memory = None;
        let mut swap = None;
        let mut cache = None;

        for line in output.lines().skip(1) {
            let (label, columns) = Self::split_memory_row(line);
            match label.as_str() {
                "Mem:" => {
                    let total = Self::memory_column(&label, &columns, 1)?;
                    let available = Self::memory_column(&label, &columns, 6)?;
                    memory = Some(MemoryUsage {
                        total,
                        used: total.saturating_sub(available),
                    });
                }
                "-/+ buffers/cache:" => {
                    let used = Self::memory_column(&label, &columns, 1)?;
                    let free = Self::memory_column(&label, &columns, 2)?;
                    let total = used.checked_add(free).ok_or_else(|| {
                        TelemetryError::parse(format!("{label} used plus free overflows"))
                    })?;
                    cache = Some(MemoryUsage { total, used });
                }
                "Swap:" => {
                    let total = Self::memory_column(&label, &columns, 1)?;
                    let free = Self::memory_column(&label, &columns, 3)?;
                    swap = Some(MemoryUsage {
                        total,
                        used: total.saturating_sub(free),
                    });
                }
                _ => {}
            }
        }

        let memory = memory.ok_or_else(|| TelemetryError::parse("no Mem: row in free output"))?;

        Ok(MemoryInfo {
            memory,
            swap: swap.unwrap_or_default(),
            cache,
        })
    }

    /// Splits a `free` row into its label and numeric columns.
    ///
    /// A new column starts at whitespace followed by a digit or `/`, so
    /// labels with spaces (`-/+ buffers/cache:`) stay in one piece.
    fn split_memory_row(line: &str) -> (String, Vec<&str>) {
        let mut label = Vec::new();
        let mut columns = Vec::new();

        for token in line.split_whitespace() {
            let starts_column = token.starts_with(|c: char| c.is_ascii_digit() || c == '/');
            if columns.is_empty() && !starts_column {
                label.push(token);
            } else {
                columns.push(token);
            }
        }

        (label.join(" "), columns)
    }

    /// Reads a 1-based column (column 0 is the label)
    fn memory_column(label: &str, columns: &[&str], index: usize) -> TelemetryResult<u64> {
        let raw = columns.get(index - 1).ok_or_else(|| {
            TelemetryError::parse(format!("{label} row has no column {index}"))
        })?;
        raw.parse().map_err(|_| {
            TelemetryError::parse(format!("{label} column {index} is not a number: '{raw}'"))
        })
    }

    /// Parses per-core lines of `/proc/stat`.
    ///
    /// Format: `cpu0 user nice system idle iowait irq softirq steal ...`
    ///
    /// Counters map by fixed position and `softirq` is read from index 8;
    /// index 7 is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ParseFailed`] if a core line is short,
    /// holds a non-integer counter, or repeats a core name.
    pub fn parse_cpu_usage(output: &str) -> TelemetryResult<Vec<CpuCoreUsage>> {
        let mut cores = Vec::new();
        let mut seen = HashSet::new();

        for line in output.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let Some(name) = parts.first() else {
                continue;
            };
            if !CORE_NAME_REGEX.is_match(name) {
                continue;
            }
            if parts.len() < CPU_LINE_MIN_FIELDS {
                return Err(TelemetryError::parse(format!(
                    "too few fields in /proc/stat line for {name}"
                )));
            }
            if !seen.insert(*name) {
                return Err(TelemetryError::parse(format!(
                    "duplicate core {name} in /proc/stat"
                )));
            }

            let p = |i: usize| -> TelemetryResult<u64> {
                parts[i].parse().map_err(|_| {
                    TelemetryError::parse(format!(
                        "{name} field {i} is not a counter: '{}'",
                        parts[i]
                    ))
                })
            };

            cores.push(CpuCoreUsage {
                name: (*name).to_string(),
                user: p(1)?,
                nice: p(2)?,
                system: p(3)?,
                idle: p(4)?,
                iowait: p(5)?,
                irq: p(6)?,
                softirq: p(8)?,
            });
        }

        Ok(cores)
    }

    /// Parses `lscpu` output.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ParseFailed`] if `Architecture`,
    /// `Vendor ID`, `Model name` or `CPU(s)` is missing, or `CPU(s)` is not
    /// an integer.
    pub fn parse_cpu_topology(output: &str) -> TelemetryResult<CpuTopology> {
        let info = Self::parse_key_values(output);
        let field = |key: &str| -> TelemetryResult<String> {
            info.get(key)
                .map(ToString::to_string)
                .ok_or_else(|| TelemetryError::parse(format!("lscpu output has no '{key}'")))
        };

        let cpus = field("CPU(s)")?;
        let core_count = cpus
            .parse()
            .map_err(|_| TelemetryError::parse(format!("CPU(s) is not an integer: '{cpus}'")))?;

        Ok(CpuTopology {
            architecture: field("Architecture")?,
            vendor: field("Vendor ID")?,
            model_name: field("Model name")?,
            core_count,
        })
    }

    /// Parses `lsb_release -drci` output.
    ///
    /// Returns `None` if any of the four keys is missing; the caller turns
    /// that into the generic OS error.
    #[must_use]
    pub fn parse_lsb_release(output: &str) -> Option<OsIdentity> {
        let info = Self::parse_key_values(output);
        let get = |key: &str| info.get(key).map(ToString::to_string);

        Some(OsIdentity {
            id: get("Distributor ID")?,
            description: get("Description")?,
            release: get("Release")?,
            codename: get("Codename")?,
        })
    }

    /// Parses `/etc/os-release` content.
    ///
    /// `ID` is required; `PRETTY_NAME` falls back to `NAME` + `VERSION`,
    /// and missing version fields become empty strings.
    #[must_use]
    pub fn parse_os_release(output: &str) -> Option<OsIdentity> {
        let vars: HashMap<&str, String> = output
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim().trim_matches('"').to_string()))
            .collect();

        let id = vars.get("ID").filter(|v| !v.is_empty())?.clone();
        let description = vars.get("PRETTY_NAME").cloned().or_else(|| {
            vars.get("NAME").map(|n| {
                vars.get("VERSION")
                    .map_or_else(|| n.clone(), |v| format!("{n} {v}"))
            })
        });

        Some(OsIdentity {
            id,
            description: description.unwrap_or_default(),
            release: vars.get("VERSION_ID").cloned().unwrap_or_default(),
            codename: vars.get("VERSION_CODENAME").cloned().unwrap_or_default(),
        })
    }

    /// Parses `/proc/uptime`, truncating both values to whole seconds.
    ///
    /// Format: `350735.47 234388.90`
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ParseFailed`] if either value is missing
    /// or not a number.
    pub fn parse_uptime(output: &str) -> TelemetryResult<UptimeInfo> {
        let mut parts = output.split_whitespace();
        let mut next = |what: &str| -> TelemetryResult<u64> {
            let raw = parts
                .next()
                .ok_or_else(|| TelemetryError::parse(format!("/proc/uptime has no {what} value")))?;
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v.trunc() as u64)
                .ok_or_else(|| {
                    TelemetryError::parse(format!("/proc/uptime {what} is not a number: '{raw}'"))
                })
        };

        Ok(UptimeInfo {
            uptime_seconds: next("uptime")?,
            idle_seconds: next("idle")?,
        })
    }

    /// Parses `key: value` lines, splitting on the first colon. Lines
    /// without a colon are ignored.
    fn parse_key_values(output: &str) -> HashMap<&str, &str> {
        output
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect()
    }
}
