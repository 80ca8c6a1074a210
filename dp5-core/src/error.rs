//! Global error types for the DP5 remote SDK.
//!
//! Every failure the SDK can surface is a variant of `Dp5Error`, with
//! conversions from the underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using Dp5Error.
pub type Dp5Result<T> = Result<T, Dp5Error>;

/// Unified error type for REST actions and the notification session.
#[derive(Error, Debug)]
pub enum Dp5Error {
    // -- Configuration errors --
    /// Failed to load or parse configuration.
    #[error("configuration error: {0}")]
    Config(String),

    // -- Request errors --
    /// The action path, base URL or a query parameter cannot form a valid URI.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The request could not be completed: I/O failure, timeout or interruption.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
        /// Whether the per-verb timeout elapsed.
        timed_out: bool,
    },

    /// The server answered with a status other than 200.
    #[error("remote action failed (status {status}): {body}")]
    RemoteAction {
        /// HTTP status code.
        status: u16,
        /// Raw response body, never decoded.
        body: String,
    },

    /// A 200 body did not contain the expected field or shape.
    #[error("decode error: {0}")]
    Decode(String),

    // -- Notification errors --
    /// The notification connect/subscribe handshake failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// An established notification session hit a protocol or socket fault.
    #[error("session {session_id} error: {message}")]
    Session {
        /// Server-assigned session identifier.
        session_id: String,
        /// Description of the fault.
        message: String,
    },

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Dp5Error {
    /// Build a transport error that is not a timeout.
    pub fn transport(message: impl Into<String>) -> Self {
        Dp5Error::Transport {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Whether this error is a transport timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Dp5Error::Transport { timed_out: true, .. })
    }

    /// The HTTP status carried by a remote action failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Dp5Error::RemoteAction { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Dp5Error {
    fn from(e: serde_json::Error) -> Self {
        Dp5Error::Decode(e.to_string())
    }
}

impl From<toml::de::Error> for Dp5Error {
    fn from(e: toml::de::Error) -> Self {
        Dp5Error::Config(e.to_string())
    }
}
