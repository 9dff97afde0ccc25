//! The client's single TCP connection to the backup server.
//!
//! All traffic goes through [`ConnectionManager::send_command`], which holds
//! the connection lock across the write and the one-line read, so concurrent
//! callers never interleave their request/response pairs.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

use pullsync_core::protocol::{self, RECOGNISED, SUCCEEDED};
use pullsync_core::{Command, Identity, LineError};

use crate::error::{ClientError, PullFailure};

/// How long connecting, and then waiting for the handshake reply, may take.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Observable lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    /// Handshake done and the initial pull answered.
    Synced,
    /// A directory watch is armed on top of a synced connection.
    Watching,
}

struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Link {
    async fn exchange(&mut self, command: &str) -> Result<Option<String>, ClientError> {
        protocol::write_line(&mut self.writer, command)
            .await
            .map_err(ClientError::ConnectionLost)?;
        match protocol::read_line(&mut self.reader).await {
            Ok(line) => Ok(line),
            Err(LineError::Io(err)) => Err(ClientError::ConnectionLost(err)),
            Err(LineError::TooLong { limit }) => Err(ClientError::ProtocolViolation(format!(
                "server response exceeds {limit} bytes"
            ))),
        }
    }
}

pub struct ConnectionManager {
    link: Mutex<Option<Link>>,
    state: watch::Sender<ConnectionState>,
    handshake_timeout: Duration,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            link: Mutex::new(None),
            state,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Open a fresh connection, closing any previous one first.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ClientError> {
        self.close().await;

        let addr = format!("{host}:{port}");
        tracing::info!(%addr, "connecting to server");
        let connecting = tokio::time::timeout(self.handshake_timeout, TcpStream::connect(&addr));
        let stream = match connecting.await {
            Ok(connected) => connected,
            Err(_) => Err(timed_out("connect", self.handshake_timeout)),
        }
        .map_err(|source| ClientError::ConnectFailure {
            addr: addr.clone(),
            source,
        })?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(error = %err, "could not disable nagle");
        }

        let (reader, writer) = stream.into_split();
        *self.link.lock().await = Some(Link {
            reader: BufReader::new(reader),
            writer,
        });
        self.set_state(ConnectionState::Handshaking);
        Ok(())
    }

    /// Send the identity line and require `Recognised` back within the
    /// handshake timeout. A server that never answers loses the connection.
    pub async fn handshake(&self, identity: &Identity) -> Result<(), ClientError> {
        let exchange = self.send_command(identity.as_str());
        let reply = match tokio::time::timeout(self.handshake_timeout, exchange).await {
            Ok(reply) => reply?,
            Err(_) => {
                self.close().await;
                let err = timed_out("handshake", self.handshake_timeout);
                return Err(ClientError::ConnectionLost(err));
            }
        };
        match reply {
            Some(line) if line == RECOGNISED => {
                tracing::info!(identity = %identity, "identity recognised by server");
                Ok(())
            }
            Some(response) => Err(ClientError::IdentityRejected { response }),
            None => Err(ClientError::IdentityRejected {
                response: "connection closed during handshake".to_string(),
            }),
        }
    }

    /// Write one command line and read exactly one response line.
    ///
    /// `Ok(None)` means the server closed the connection; the connection is
    /// released in that case and on any transport error.
    pub async fn send_command(&self, command: &str) -> Result<Option<String>, ClientError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(ClientError::NotConnected)?;

        let result = link.exchange(command).await;
        let keep = matches!(result, Ok(Some(_)));
        if !keep {
            if let Some(mut link) = guard.take() {
                let _ = link.writer.shutdown().await;
            }
            self.set_state(ConnectionState::Disconnected);
        }
        result
    }

    /// Ask the server to pull this client's files.
    pub async fn send_pull_request(&self) -> Result<(), ClientError> {
        match self.send_command(Command::PullRequest.as_wire()).await? {
            Some(line) if line == SUCCEEDED => Ok(()),
            Some(sentence) => Err(ClientError::PullFailed(PullFailure::Rejected(sentence))),
            None => Err(ClientError::PullFailed(PullFailure::ConnectionClosed)),
        }
    }

    /// Tell the server this client is leaving. No response is expected.
    pub async fn send_exit(&self) -> Result<(), ClientError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(ClientError::NotConnected)?;
        protocol::write_line(&mut link.writer, Command::Exit.as_wire())
            .await
            .map_err(ClientError::ConnectionLost)
    }

    /// Best-effort `exit` followed by [`close`](Self::close).
    pub async fn leave(&self) {
        if let Err(err) = self.send_exit().await {
            tracing::debug!(error = %err, "could not send exit");
        }
        self.close().await;
    }

    /// Shut the connection down. Safe to call repeatedly and concurrently.
    pub async fn close(&self) {
        let link = self.link.lock().await.take();
        if let Some(mut link) = link {
            if let Err(err) = link.writer.shutdown().await {
                tracing::debug!(error = %err, "socket shutdown failed");
            }
            tracing::info!("connection closed");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "connection state changed");
        }
    }
}

fn timed_out(stage: &str, after: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{stage} timed out after {} ms", after.as_millis()),
    )
}
