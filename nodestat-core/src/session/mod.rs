//! Session lifecycle over a [`RemoteTransport`]
//!
//! A [`Session`] owns the lifecycle state of one transport. Every command
//! goes through [`Session::exec`], which refuses to run unless the session
//! is [`SessionState::Ready`].

mod executor;

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::Instrument;

use crate::error::{TelemetryError, TelemetryResult};
use crate::tracing::span_names;
use crate::transport::RemoteTransport;

pub use executor::run_command;

/// Lifecycle state of a [`Session`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No channel has been opened (or the last connect failed)
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Commands may run
    Ready,
    /// Shutdown in progress
    Closing,
    /// Channel shut down; a new connect is allowed
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// One remote host channel plus its lifecycle state
pub struct Session {
    transport: Arc<dyn RemoteTransport>,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.transport.describe())
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Wraps a transport; the session starts `Disconnected`
    #[must_use]
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            state: RwLock::new(SessionState::Disconnected),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true when commands may run
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Fails with [`TelemetryError::NotConnected`] unless `Ready`
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` in every state other than `Ready`.
    pub fn ensure_ready(&self) -> TelemetryResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(TelemetryError::NotConnected)
        }
    }

    /// Target description from the transport
    #[must_use]
    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Moves `from` -> `to` atomically, failing if the current state is not
    /// one of `from`
    fn transition(&self, from: &[SessionState], to: SessionState) -> Result<(), SessionState> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if from.contains(&state) {
            *state = to;
            Ok(())
        } else {
            Err(*state)
        }
    }

    /// Opens the channel. Allowed from `Disconnected` and `Closed`.
    ///
    /// On failure the session returns to `Disconnected` and may be
    /// connected again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when called from another state and
    /// `ConnectFailed` when the transport handshake fails.
    pub async fn connect(&self) -> TelemetryResult<()> {
        let span = tracing::info_span!(span_names::SESSION_CONNECT, host = %self.describe());
        self.connect_inner().instrument(span).await
    }

    async fn connect_inner(&self) -> TelemetryResult<()> {
        self.transition(
            &[SessionState::Disconnected, SessionState::Closed],
            SessionState::Connecting,
        )
        .map_err(TelemetryError::InvalidState)?;

        match self.transport.connect().await {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                tracing::info!(host = %self.describe(), "Session ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                tracing::warn!(host = %self.describe(), error = %e, "Connect failed");
                Err(TelemetryError::ConnectFailed(e.to_string()))
            }
        }
    }

    /// Shuts the channel down. Allowed only from `Ready`.
    ///
    /// On failure the session stays `Ready`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the session is not `Ready` and
    /// `CloseFailed` when the transport does not confirm shutdown.
    pub async fn close(&self) -> TelemetryResult<()> {
        let span = tracing::info_span!(span_names::SESSION_CLOSE, host = %self.describe());
        self.close_inner().instrument(span).await
    }

    async fn close_inner(&self) -> TelemetryResult<()> {
        self.transition(&[SessionState::Ready], SessionState::Closing)
            .map_err(|_| TelemetryError::NotConnected)?;

        match self.transport.close().await {
            Ok(()) => {
                self.set_state(SessionState::Closed);
                tracing::info!(host = %self.describe(), "Session closed");
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Ready);
                tracing::warn!(host = %self.describe(), error = %e, "Close failed");
                Err(TelemetryError::CloseFailed(e.to_string()))
            }
        }
    }

    /// Runs one command, returning trimmed stdout.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` unless `Ready`, `CommandFailed` when the
    /// command wrote to stderr, or a transport error.
    pub async fn exec(&self, command: &str) -> TelemetryResult<String> {
        self.ensure_ready()?;
        run_command(self.transport.as_ref(), command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::transport::ExecOutput;

    fn session() -> (Arc<MockTransport>, Session) {
        let mock = Arc::new(MockTransport::new().with_response("hostname", "gpu-box\n"));
        let session = Session::new(mock.clone());
        (mock, session)
    }

    #[tokio::test]
    async fn test_exec_before_connect_sends_nothing() {
        let (mock, session) = session();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.exec("hostname").await,
            Err(TelemetryError::NotConnected)
        ));
        assert_eq!(mock.exec_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_exec_close() {
        let (mock, session) = session();
        session.connect().await.unwrap();
        assert!(session.is_ready());
        assert_eq!(session.exec("hostname").await.unwrap(), "gpu-box");
        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.exec("hostname").await,
            Err(TelemetryError::NotConnected)
        ));
        assert_eq!(mock.exec_count(), 1);
    }

    #[tokio::test]
    async fn test_exec_fails_on_newline_only_stderr() {
        let mock = Arc::new(MockTransport::new().with_output(
            "hostname",
            ExecOutput {
                stdout: "gpu-box\n".to_string(),
                stderr: "\n".to_string(),
                exit_code: Some(0),
            },
        ));
        let session = Session::new(mock);
        session.connect().await.unwrap();
        assert!(matches!(
            session.exec("hostname").await,
            Err(TelemetryError::CommandFailed(ref m)) if m.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_connect_twice_is_invalid() {
        let (_mock, session) = session();
        session.connect().await.unwrap();
        assert!(matches!(
            session.connect().await,
            Err(TelemetryError::InvalidState(SessionState::Ready))
        ));
    }

    #[tokio::test]
    async fn test_reconnect_after_close() {
        let (mock, session) = session();
        session.connect().await.unwrap();
        session.close().await.unwrap();
        session.connect().await.unwrap();
        assert!(session.is_ready());
        assert_eq!(mock.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_disconnected() {
        let mock = Arc::new(MockTransport::new().failing_connect("Permission denied (publickey)"));
        let session = Session::new(mock.clone());
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, TelemetryError::ConnectFailed(ref m) if m.contains("Permission denied")));
        assert_eq!(session.state(), SessionState::Disconnected);

        mock.set_connect_failure(None);
        session.connect().await.unwrap();
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_close_when_not_ready() {
        let (_mock, session) = session();
        assert!(matches!(
            session.close().await,
            Err(TelemetryError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_failed_close_keeps_session_ready() {
        let mock = Arc::new(MockTransport::new().failing_close("master refused exit"));
        let session = Session::new(mock);
        session.connect().await.unwrap();
        assert!(matches!(
            session.close().await,
            Err(TelemetryError::CloseFailed(_))
        ));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Ready.to_string(), "ready");
        assert_eq!(SessionState::Disconnected.to_string(), "disconnected");
    }
}
