//! Remote execution transports
//!
//! A transport owns one channel to one host. The session layer drives it
//! through [`RemoteTransport`] and never looks at how commands travel.

mod ssh;

use async_trait::async_trait;

use crate::error::TransportResult;

pub use ssh::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_EXEC_TIMEOUT_SECS, OpenSshTransport, SshTarget};

/// Raw result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output, chunks concatenated in arrival order
    pub stdout: String,
    /// Standard error, chunks concatenated in arrival order
    pub stderr: String,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
}

impl ExecOutput {
    /// Output with only stdout and a zero exit code
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Output with only stderr and a non-zero exit code
    pub fn stderr(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(1),
        }
    }
}

/// Capability to run commands on one remote host over a persistent channel
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Opens the channel (authentication and handshake)
    async fn connect(&self) -> TransportResult<()>;

    /// Runs one command over the open channel
    async fn execute(&self, command: &str) -> TransportResult<ExecOutput>;

    /// Shuts the channel down
    async fn close(&self) -> TransportResult<()>;

    /// Short description of the target for logs, e.g. `ops@gpu-box:22`
    fn describe(&self) -> String;
}
