use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the listener, sessions and command execution.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not bind listening socket on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Line(#[from] pullsync_core::LineError),

    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    #[error("cannot execute an empty command")]
    EmptyCommand,

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServerError {
    ServerError::Io {
        path: path.into(),
        source,
    }
}
