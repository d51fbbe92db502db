//! Error types for the modemfleet library.

use thiserror::Error;

/// The main error type for modem and fleet operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The modem link is up but unusable (e.g. no answer to `AT`).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Transport is not open.
    #[error("not connected")]
    NotConnected,

    /// Command timed out waiting for a terminal token.
    #[error("command `{command}` timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// Explicit ERROR/FAIL from the modem, or an unparseable response.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// SIM card is not in the `READY` state.
    #[error("SIM not ready: {state}")]
    NotReady { state: String },

    /// Unknown modem id, or connect-on-demand failed.
    #[error("modem {id} not found")]
    NotFound { id: String },

    /// Modem already has a live session.
    #[error("modem {id} is already connected")]
    AlreadyConnected { id: String },

    /// Concurrency limit reached.
    #[error("maximum number of connected modems ({max}) reached")]
    LimitExceeded { max: usize },

    /// Every SMS/USSD submission strategy failed.
    #[error("all {operation} methods failed after {attempts} attempts, last error: {last}")]
    AllMethodsFailed {
        operation: &'static str,
        attempts: usize,
        last: Box<Error>,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Coarse error classification for callers that translate errors into
/// their own representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Port open/read/write failure.
    Transport,
    /// Deadline exceeded after retries.
    Timeout,
    /// ERROR/FAIL token or unparseable response.
    Protocol,
    /// SIM not ready.
    NotReady,
    /// Unknown modem.
    NotFound,
    /// Modem already connected.
    AlreadyConnected,
    /// Concurrency limit reached.
    LimitExceeded,
    /// Fallback chain exhausted.
    AllMethodsFailed,
    /// Configuration rejected.
    InvalidConfig,
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Serial(_) | Self::Io(_) | Self::Transport { .. } | Self::NotConnected => {
                ErrorKind::Transport
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyConnected { .. } => ErrorKind::AlreadyConnected,
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::AllMethodsFailed { .. } => ErrorKind::AllMethodsFailed,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    /// Returns true if the link itself failed, as opposed to the modem
    /// rejecting or not answering a single command.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn timeout(command: &str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            command: command.to_owned(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Result type alias for modemfleet operations.
pub type Result<T> = std::result::Result<T, Error>;
