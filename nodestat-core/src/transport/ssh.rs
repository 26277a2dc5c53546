//! OpenSSH transport built on connection multiplexing
//!
//! `connect` starts a ControlMaster (`ssh -M -N`) and waits until its
//! control socket answers `-O check`. Every command then runs through
//! `ssh -S <socket>`, reusing the authenticated master instead of opening
//! a new connection. `close` sends `-O exit` to the master.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ExecOutput, RemoteTransport};
use crate::error::{TransportError, TransportResult};

/// Default timeout for the master connection handshake (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default timeout for a single remote command (seconds)
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 10;

/// How often `connect` polls the control socket
const MASTER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where and how to reach the remote host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshTarget {
    /// Remote hostname or IP
    pub host: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user; ssh's own default when `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Private key path; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    /// Password for `sshpass`; never serialized
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    /// Handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Per-command timeout in seconds
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,
    /// Extra `-o` options, e.g. `ProxyJump=bastion`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_options: Vec<String>,
}

const fn default_port() -> u16 {
    22
}

const fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_exec_timeout() -> u64 {
    DEFAULT_EXEC_TIMEOUT_SECS
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|p| p.map(SecretString::from))
}

impl Default for SshTarget {
    fn default() -> Self {
        Self::new("")
    }
}

impl SshTarget {
    /// Creates a target with default port and timeouts
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: None,
            identity_file: None,
            password: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            extra_options: Vec::new(),
        }
    }

    /// Sets the login user
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the SSH port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the private key path
    #[must_use]
    pub fn with_identity_file(mut self, path: impl Into<String>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Sets a password for `sshpass` authentication
    #[must_use]
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// `user@host` or `host`
    #[must_use]
    pub fn destination(&self) -> String {
        self.username
            .as_ref()
            .map_or_else(|| self.host.clone(), |user| format!("{user}@{}", self.host))
    }
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.destination(), self.port)
    }
}

/// [`RemoteTransport`] backed by an OpenSSH ControlMaster
pub struct OpenSshTransport {
    target: SshTarget,
    control_path: PathBuf,
    use_sshpass: bool,
    master: Mutex<Option<Child>>,
}

impl OpenSshTransport {
    /// Creates a transport for `target`. Nothing is spawned until
    /// [`RemoteTransport::connect`].
    #[must_use]
    pub fn new(target: SshTarget) -> Self {
        // Check sshpass availability once at creation time
        let use_sshpass = target.password.is_some()
            && std::process::Command::new("sshpass")
                .arg("-V")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok();

        if target.password.is_some() && !use_sshpass {
            tracing::warn!(
                host = %target,
                "Password configured but sshpass is not installed, falling back to key auth"
            );
        }

        let control_path =
            std::env::temp_dir().join(format!("nodestat-{}.sock", Uuid::new_v4().simple()));

        Self {
            target,
            control_path,
            use_sshpass,
            master: Mutex::new(None),
        }
    }

    /// The target this transport connects to
    #[must_use]
    pub const fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Builds an `ssh` invocation with the shared options and control socket
    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        self.push_common_args(&mut cmd);
        cmd
    }

    /// Builds the master invocation, wrapped in `sshpass -e` for password auth
    fn master_command(&self) -> Command {
        let mut cmd = if self.use_sshpass {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e").arg("ssh");
            // sshpass reads the password from SSHPASS with -e
            if let Some(ref pw) = self.target.password {
                cmd.env("SSHPASS", pw.expose_secret());
            }
            cmd
        } else {
            let mut cmd = Command::new("ssh");
            cmd.arg("-o").arg("BatchMode=yes");
            cmd
        };

        self.push_common_args(&mut cmd);
        cmd.arg("-M").arg("-N");
        cmd.arg("-o").arg("ControlPersist=no");
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.target.connect_timeout_secs));
        cmd.arg(self.target.destination());
        cmd
    }

    fn push_common_args(&self, cmd: &mut Command) {
        cmd.arg("-S").arg(&self.control_path);
        // Keeps ssh's own notices off stderr, which marks commands as failed
        cmd.arg("-o").arg("LogLevel=ERROR");

        if self.target.port != 22 {
            cmd.arg("-p").arg(self.target.port.to_string());
        }
        if let Some(ref key) = self.target.identity_file {
            cmd.arg("-i").arg(shellexpand::tilde(key).as_ref());
        }
        for option in &self.target.extra_options {
            cmd.arg("-o").arg(option);
        }
    }

    /// Asks the master whether it is up
    async fn master_alive(&self) -> bool {
        let mut cmd = self.ssh_command();
        cmd.arg("-O").arg("check").arg(self.target.destination());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.status().await.is_ok_and(|s| s.success())
    }

    async fn read_stderr(child: &mut Child) -> String {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr).await;
        }
        stderr.trim().to_string()
    }

    fn remove_control_socket(&self) {
        let _ = std::fs::remove_file(&self.control_path);
    }
}

#[async_trait]
impl RemoteTransport for OpenSshTransport {
    async fn connect(&self) -> TransportResult<()> {
        let mut master = self.master.lock().await;
        if let Some(mut stale) = master.take() {
            let _ = stale.kill().await;
        }
        self.remove_control_socket();

        let program = if self.use_sshpass { "sshpass" } else { "ssh" };
        let mut cmd = self.master_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| TransportError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        let timeout = Duration::from_secs(self.target.connect_timeout_secs);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Ok(Some(status)) = child.try_wait() {
                let stderr = Self::read_stderr(&mut child).await;
                return Err(TransportError::Handshake(if stderr.is_empty() {
                    format!("ssh master exited with {status}")
                } else {
                    stderr
                }));
            }

            if self.master_alive().await {
                tracing::debug!(host = %self.target, "SSH master connection established");
                *master = Some(child);
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                let _ = child.kill().await;
                self.remove_control_socket();
                return Err(TransportError::Timeout {
                    operation: "connect",
                    secs: self.target.connect_timeout_secs,
                });
            }

            tokio::time::sleep(MASTER_POLL_INTERVAL).await;
        }
    }

    async fn execute(&self, command: &str) -> TransportResult<ExecOutput> {
        if self.master.lock().await.is_none() {
            return Err(TransportError::NotConnected);
        }

        let mut cmd = self.ssh_command();
        cmd.arg("-o").arg("ControlMaster=no");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg(self.target.destination());
        cmd.arg(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.target.exec_timeout_secs);

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8(output.stdout)
                    .map_err(|e| TransportError::InvalidOutput(format!("stdout: {e}")))?;
                Ok(ExecOutput {
                    stdout,
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                })
            }
            Ok(Err(e)) => Err(TransportError::Spawn {
                program: "ssh".to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                operation: "exec",
                secs: self.target.exec_timeout_secs,
            }),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        let mut master = self.master.lock().await;
        let Some(mut child) = master.take() else {
            return Err(TransportError::NotConnected);
        };

        let mut cmd = self.ssh_command();
        cmd.arg("-O").arg("exit").arg(self.target.destination());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let timeout = Duration::from_secs(self.target.connect_timeout_secs);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                *master = Some(child);
                return Err(TransportError::Spawn {
                    program: "ssh".to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                *master = Some(child);
                return Err(TransportError::Timeout {
                    operation: "close",
                    secs: self.target.connect_timeout_secs,
                });
            }
        };

        if !output.status.success() {
            *master = Some(child);
            return Err(TransportError::Shutdown(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        if tokio::time::timeout(timeout, child.wait()).await.is_err() {
            tracing::debug!(host = %self.target, "SSH master did not exit in time, killing it");
            let _ = child.kill().await;
        }
        self.remove_control_socket();
        Ok(())
    }

    fn describe(&self) -> String {
        self.target.to_string()
    }
}
