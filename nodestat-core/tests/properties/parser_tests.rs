//! Property-based tests for command output parsers

use std::collections::HashSet;

use nodestat_core::MetricsParser;
use proptest::prelude::*;

/// Strategy for a kilobyte column of `free`
fn arb_kib() -> impl Strategy<Value = u64> {
    0u64..(1 << 40)
}

/// Strategy for one core's ten `/proc/stat` counters
fn arb_counters() -> impl Strategy<Value = [u64; 10]> {
    prop::array::uniform10(0u64..(1 << 48))
}

fn free_output(mem: [u64; 6], swap: [u64; 3]) -> String {
    format!(
        "               total        used        free      shared  buff/cache   available\n\
         Mem:    {} {} {} {} {} {}\n\
         Swap:   {} {} {}\n",
        mem[0], mem[1], mem[2], mem[3], mem[4], mem[5], swap[0], swap[1], swap[2]
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Used never exceeds total, whatever `free` reports for available/free
    #[test]
    fn prop_memory_used_never_exceeds_total(
        mem in prop::array::uniform6(arb_kib()),
        swap in prop::array::uniform3(arb_kib()),
    ) {
        let info = MetricsParser::parse_memory(&free_output(mem, swap)).unwrap();

        prop_assert_eq!(info.memory.total, mem[0]);
        prop_assert!(info.memory.used <= info.memory.total);
        prop_assert_eq!(info.swap.total, swap[0]);
        prop_assert!(info.swap.used <= info.swap.total);
        prop_assert!(info.cache.is_none());
    }

    /// Every core line yields one sample with counters in fixed positions
    #[test]
    fn prop_cpu_counters_map_by_position(cores in prop::collection::vec(arb_counters(), 1..64)) {
        let output: String = cores
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let counters: Vec<String> = c.iter().map(u64::to_string).collect();
                format!("cpu{i} {}\n", counters.join(" "))
            })
            .collect();

        let parsed = MetricsParser::parse_cpu_usage(&output).unwrap();
        prop_assert_eq!(parsed.len(), cores.len());

        let names: HashSet<&str> = parsed.iter().map(|c| c.name.as_str()).collect();
        prop_assert_eq!(names.len(), parsed.len());

        for (core, counters) in parsed.iter().zip(&cores) {
            prop_assert_eq!(core.user, counters[0]);
            prop_assert_eq!(core.nice, counters[1]);
            prop_assert_eq!(core.system, counters[2]);
            prop_assert_eq!(core.idle, counters[3]);
            prop_assert_eq!(core.iowait, counters[4]);
            prop_assert_eq!(core.irq, counters[5]);
            prop_assert_eq!(core.softirq, counters[7]);
        }
    }

    /// Repeating a core name is rejected
    #[test]
    fn prop_duplicate_core_rejected(counters in arb_counters(), index in 0u32..256) {
        let line = format!(
            "cpu{index} {}",
            counters.iter().map(u64::to_string).collect::<Vec<_>>().join(" ")
        );
        let output = format!("{line}\n{line}\n");
        prop_assert!(MetricsParser::parse_cpu_usage(&output).is_err());
    }

    /// Uptime values are truncated to whole seconds
    #[test]
    fn prop_uptime_truncates(
        up in 0u64..10_000_000_000,
        up_frac in 0u32..100,
        idle in 0u64..10_000_000_000,
        idle_frac in 0u32..100,
    ) {
        let output = format!("{up}.{up_frac:02} {idle}.{idle_frac:02}");
        let uptime = MetricsParser::parse_uptime(&output).unwrap();
        prop_assert_eq!(uptime.uptime_seconds, up);
        prop_assert_eq!(uptime.idle_seconds, idle);
    }

    /// Arbitrary text never panics a parser
    #[test]
    fn prop_parsers_reject_garbage_without_panicking(text in "\\PC{0,200}") {
        let _ = MetricsParser::parse_memory(&text);
        let _ = MetricsParser::parse_cpu_usage(&text);
        let _ = MetricsParser::parse_cpu_topology(&text);
        let _ = MetricsParser::parse_uptime(&text);
        let _ = MetricsParser::parse_lsb_release(&text);
        let _ = MetricsParser::parse_os_release(&text);
    }
}
