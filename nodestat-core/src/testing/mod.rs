//! Scripted transport for exercising sessions and nodes without a network
//!
//! [`MockTransport`] answers each command from a table of canned outputs
//! and records every command it receives. [`MockTransport::linux_host`]
//! preloads outputs of a typical Ubuntu host with two GPUs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{TransportError, TransportResult};
use crate::metrics::{
    CPU_TOPOLOGY_COMMAND, CPU_USAGE_COMMAND, GpuQuerySchema, HOSTNAME_COMMAND,
    LSB_RELEASE_COMMAND, MEMORY_COMMAND, OS_RELEASE_COMMAND, UPTIME_COMMAND,
};
use crate::transport::{ExecOutput, RemoteTransport};

/// `free` on a 16 GiB host
pub const FREE_FIXTURE: &str = "\
               total        used        free      shared  buff/cache   available
Mem:        16318480     5043712     6453308      812220     4821460    10138200
Swap:        2097148      524288     1572860
";

/// Per-core lines of `/proc/stat` for a 4-core host
pub const PROC_STAT_FIXTURE: &str = "\
cpu0 10132153 290696 3084719 46828483 16683 0 25195 0 0 0
cpu1 9882103 281203 2990012 47100232 15011 0 7019 0 0 0
cpu2 9751209 279120 2951871 47282120 14806 0 6512 0 0 0
cpu3 9690112 276011 2930019 47390155 14411 0 6208 0 0 0
";

/// `lscpu` excerpt
pub const LSCPU_FIXTURE: &str = "\
Architecture:                    x86_64
CPU op-mode(s):                  32-bit, 64-bit
Byte Order:                      Little Endian
CPU(s):                          4
Vendor ID:                       GenuineIntel
Model name:                      Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
";

/// `lsb_release -drci`
pub const LSB_RELEASE_FIXTURE: &str = "\
Distributor ID:\tUbuntu
Description:\tUbuntu 22.04.4 LTS
Release:\t22.04
Codename:\tjammy
";

/// `/etc/os-release`
pub const OS_RELEASE_FIXTURE: &str = "\
PRETTY_NAME=\"Ubuntu 22.04.4 LTS\"
NAME=\"Ubuntu\"
VERSION_ID=\"22.04\"
VERSION=\"22.04.4 LTS (Jammy Jellyfish)\"
VERSION_CODENAME=jammy
ID=ubuntu
ID_LIKE=debian
";

/// `/proc/uptime`
pub const UPTIME_FIXTURE: &str = "350735.47 1234388.90\n";

/// Default-schema `nvidia-smi` output for two devices
pub const NVIDIA_SMI_FIXTURE: &str = "\
NVIDIA GeForce RTX 3090, GPU-5d9f3c2a-1b7e-4a41-9c2b-0f7e1d6a9b10, 0, 45, 12, 1024, 24576
NVIDIA GeForce RTX 3090, GPU-a81c77e0-3f0d-4c2e-8d5b-6e2a4f1c9d33, 1, 38, 0, 3, 24576
";

/// Hostname of [`MockTransport::linux_host`]
pub const HOSTNAME_FIXTURE: &str = "gpu-node-01";

/// Transport that answers from a command table
///
/// Unknown commands produce `bash: <cmd>: command not found` on stderr.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, ExecOutput>>,
    commands: Mutex<Vec<String>>,
    connect_failure: Mutex<Option<String>>,
    close_failure: Mutex<Option<String>>,
    exec_delay: Mutex<Option<Duration>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl MockTransport {
    /// Creates a transport with no scripted commands
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport scripted as an Ubuntu host with two GPUs
    #[must_use]
    pub fn linux_host() -> Self {
        Self::new()
            .with_response(HOSTNAME_COMMAND, format!("{HOSTNAME_FIXTURE}\n"))
            .with_response(MEMORY_COMMAND, FREE_FIXTURE)
            .with_response(CPU_USAGE_COMMAND, PROC_STAT_FIXTURE)
            .with_response(CPU_TOPOLOGY_COMMAND, LSCPU_FIXTURE)
            .with_response(LSB_RELEASE_COMMAND, LSB_RELEASE_FIXTURE)
            .with_response(OS_RELEASE_COMMAND, OS_RELEASE_FIXTURE)
            .with_response(UPTIME_COMMAND, UPTIME_FIXTURE)
            .with_response(&GpuQuerySchema::default().command(), NVIDIA_SMI_FIXTURE)
    }

    /// Scripts `command` to print `stdout`
    #[must_use]
    pub fn with_response(self, command: &str, stdout: impl Into<String>) -> Self {
        self.set_output(command, ExecOutput::stdout(stdout));
        self
    }

    /// Scripts `command` to print `stderr` and exit non-zero
    #[must_use]
    pub fn with_failure(self, command: &str, stderr: impl Into<String>) -> Self {
        self.set_output(command, ExecOutput::stderr(stderr));
        self
    }

    /// Scripts `command` with a full output
    #[must_use]
    pub fn with_output(self, command: &str, output: ExecOutput) -> Self {
        self.set_output(command, output);
        self
    }

    /// Makes every `connect` fail with `reason`
    #[must_use]
    pub fn failing_connect(self, reason: &str) -> Self {
        self.set_connect_failure(Some(reason));
        self
    }

    /// Makes every `close` fail with `reason`
    #[must_use]
    pub fn failing_close(self, reason: &str) -> Self {
        self.set_close_failure(Some(reason));
        self
    }

    /// Delays every command by `delay` (honours a paused tokio clock)
    #[must_use]
    pub fn with_exec_delay(self, delay: Duration) -> Self {
        *self.exec_delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    /// Replaces the scripted output of `command`
    pub fn set_output(&self, command: &str, output: ExecOutput) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.to_string(), output);
    }

    /// Sets or clears the connect failure
    pub fn set_connect_failure(&self, reason: Option<&str>) {
        *self
            .connect_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_string);
    }

    /// Sets or clears the close failure
    pub fn set_close_failure(&self, reason: Option<&str>) {
        *self
            .close_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_string);
    }

    /// Every command received, in order
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of commands received
    #[must_use]
    pub fn exec_count(&self) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// How many times `command` was received
    #[must_use]
    pub fn count_of(&self, command: &str) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| *c == command)
            .count()
    }

    /// Number of successful connects
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of successful closes
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn connect(&self) -> TransportResult<()> {
        let failure = self
            .connect_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(reason) = failure {
            return Err(TransportError::Handshake(reason));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, command: &str) -> TransportResult<ExecOutput> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());

        let delay = *self.exec_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let output = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .cloned();
        Ok(output.unwrap_or_else(|| {
            ExecOutput::stderr(format!("bash: {command}: command not found\n"))
        }))
    }

    async fn close(&self) -> TransportResult<()> {
        let failure = self
            .close_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(reason) = failure {
            return Err(TransportError::Shutdown(reason));
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
