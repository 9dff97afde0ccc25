//! Error types for pullsync-client.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server answered the handshake with something other than
    /// `Recognised`, or closed the connection instead.
    #[error("the server did not recognise this client: {response}")]
    IdentityRejected { response: String },

    #[error("pull request failed: {0}")]
    PullFailed(PullFailure),

    #[error("not connected to the server")]
    NotConnected,

    #[error("connection to the server lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{path} is not a directory that can be watched")]
    WatchTarget { path: PathBuf },
}

/// Why a `PullRequest` did not come back as `Succeeded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullFailure {
    /// No response line; the server closed the connection.
    ConnectionClosed,
    /// The server answered with this failure sentence.
    Rejected(String),
}

impl fmt::Display for PullFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullFailure::ConnectionClosed => f.write_str("the server closed the connection"),
            PullFailure::Rejected(sentence) => write!(f, "server reported: {sentence}"),
        }
    }
}

impl ClientError {
    /// True when the current connection can no longer be used and the
    /// caller should reconnect.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected
                | ClientError::ConnectionLost(_)
                | ClientError::ProtocolViolation(_)
                | ClientError::PullFailed(PullFailure::ConnectionClosed)
        )
    }
}
