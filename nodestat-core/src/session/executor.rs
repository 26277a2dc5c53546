//! Single-command execution with the stderr-means-failure rule

use crate::error::{TelemetryError, TelemetryResult};
use crate::transport::RemoteTransport;

/// Runs `command` and returns its trimmed stdout.
///
/// Any output on stderr, whitespace included, fails the command with
/// [`TelemetryError::CommandFailed`], even when stdout is non-empty and the
/// exit code is zero. The exit code itself is not consulted.
///
/// # Errors
///
/// Returns `CommandFailed` with the trimmed stderr text, or the transport
/// error when the command could not be run at all.
pub async fn run_command(
    transport: &dyn RemoteTransport,
    command: &str,
) -> TelemetryResult<String> {
    let output = transport.execute(command).await?;

    tracing::debug!(
        command,
        exit_code = ?output.exit_code,
        stdout_len = output.stdout.len(),
        "Remote command finished"
    );

    if !output.stderr.is_empty() {
        return Err(TelemetryError::CommandFailed(
            output.stderr.trim().to_string(),
        ));
    }

    Ok(output.stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::transport::ExecOutput;

    #[tokio::test]
    async fn test_stdout_is_trimmed() {
        let mock = MockTransport::new().with_response("uptime", "  \n123.4 56.7\n\n");
        assert_eq!(run_command(&mock, "uptime").await.unwrap(), "123.4 56.7");
    }

    #[tokio::test]
    async fn test_stderr_fails_even_with_stdout() {
        let mock = MockTransport::new().with_output(
            "lsb_release -drci",
            ExecOutput {
                stdout: "Distributor ID:\tUbuntu\n".to_string(),
                stderr: "No LSB modules are available.\n".to_string(),
                exit_code: Some(0),
            },
        );
        let err = run_command(&mock, "lsb_release -drci").await.unwrap_err();
        assert!(
            matches!(err, TelemetryError::CommandFailed(ref m) if m == "No LSB modules are available.")
        );
    }

    #[tokio::test]
    async fn test_whitespace_only_stderr_fails() {
        let mock = MockTransport::new().with_output(
            "hostname",
            ExecOutput {
                stdout: "gpu-box\n".to_string(),
                stderr: "\n".to_string(),
                exit_code: Some(0),
            },
        );
        let err = run_command(&mock, "hostname").await.unwrap_err();
        assert!(matches!(err, TelemetryError::CommandFailed(ref m) if m.is_empty()));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_succeeds() {
        let mock = MockTransport::new().with_output(
            "grep",
            ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(1),
            },
        );
        assert_eq!(run_command(&mock, "grep").await.unwrap(), "");
    }
}
