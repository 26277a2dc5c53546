//! Error types for `nodestat`
//!
//! Each concern has its own `thiserror` enum and `Result` alias. Remote
//! telemetry operations surface [`TelemetryError`]; transports report
//! [`TransportError`], which converts into it unchanged.

use thiserror::Error;

use crate::session::SessionState;

/// Generic message reported when neither `lsb_release` nor
/// `/etc/os-release` yields an operating system identity
pub const OS_INFO_UNAVAILABLE: &str = "operating system information unavailable";

/// Errors raised by session, parser and facade operations
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Operation attempted while the session is not `Ready`
    #[error("Session is not connected. Call connect() first")]
    NotConnected,

    /// Lifecycle call made from a state that does not allow it
    #[error("Invalid session state for this operation: {0}")]
    InvalidState(SessionState),

    /// Transport handshake failed or timed out
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Remote command wrote to its error stream
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Command output did not match the expected grammar
    #[error("Failed to parse command output: {0}")]
    ParseFailed(String),

    /// GPU query tool failed (no GPU, or not an NVIDIA GPU)
    #[error("No GPU available: {0}")]
    NoGpuAvailable(String),

    /// Transport did not confirm shutdown
    #[error("Close failed: {0}")]
    CloseFailed(String),

    /// Transport-level failure while executing a command
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TelemetryError {
    /// Shorthand for [`TelemetryError::ParseFailed`]
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseFailed(msg.into())
    }

    /// Returns true for errors caused by the session lifecycle rather than
    /// by a remote command
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::InvalidState(_)
                | Self::ConnectFailed(_)
                | Self::CloseFailed(_)
        )
    }
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors reported by a [`crate::transport::RemoteTransport`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Local helper process (ssh, sshpass) could not be spawned
    #[error("Failed to spawn {program}: {reason}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// OS error description
        reason: String,
    },

    /// Operation did not complete in time
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Operation name (connect, exec, close)
        operation: &'static str,
        /// Timeout that elapsed
        secs: u64,
    },

    /// Authentication or master connection setup failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Master connection refused the exit request
    #[error("Shutdown failed: {0}")]
    Shutdown(String),

    /// No master connection is open
    #[error("Transport is not connected")]
    NotConnected,

    /// Command output was not valid UTF-8
    #[error("Invalid output: {0}")]
    InvalidOutput(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path that was read
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::config::NodeConfig`]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config parsed but holds an unusable value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
