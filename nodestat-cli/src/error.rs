//! CLI error types and exit codes.

use nodestat_core::{ConfigError, TelemetryError};

/// Exit codes for CLI operations
pub mod exit_codes {
    /// General error - configuration, parsing, or other non-connection errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Connection failure - the session could not be opened or was lost
    pub const CONNECTION_FAILURE: i32 = 2;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session could not be opened, or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// A remote command failed or its output could not be decoded
    #[error("Command error: {0}")]
    Command(String),

    /// Output could not be serialized
    #[error("Output error: {0}")]
    Output(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<TelemetryError> for CliError {
    fn from(err: TelemetryError) -> Self {
        if err.is_lifecycle() || matches!(err, TelemetryError::Transport(_)) {
            Self::Connection(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: General error (configuration, command, output, IO)
    /// - 2: Connection failure
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Connection(_) => exit_codes::CONNECTION_FAILURE,
            Self::Config(_) | Self::Command(_) | Self::Output(_) | Self::Io(_) => {
                exit_codes::GENERAL_ERROR
            }
        }
    }
}
