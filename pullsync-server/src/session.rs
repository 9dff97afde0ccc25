//! One client connection on the server.
//!
//! # State machine
//!
//! ```text
//!                                        PullRequest, unknown command
//!                                      ┌───┐
//!                                      ▼   │
//! AwaitingIdentity ──known identity──▶ Active ──exit / end-of-stream / error──▶ Closed
//!        │
//!        └──unknown / end-of-stream──▶ Rejected ──▶ Closed
//! ```
//!
//! [`SessionState::step`] is the pure transition function; [`ClientSession`]
//! drives it over any async reader/writer pair and guarantees the connection
//! is shut down exactly once whichever way the session ends.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use pullsync_core::protocol::{
    read_line, write_line, IDENTITY_REJECTED, RECOGNISED, UNKNOWN_COMMAND,
};
use pullsync_core::{AllowList, Command, Identity, ShutdownSignal};

use crate::error::ServerError;
use crate::executor::PullExecutor;

/// Shared, read-only state every session of a server needs.
pub struct SessionContext {
    pub allow_list: AllowList,
    pub executor: PullExecutor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingIdentity,
    Active { identity: Identity },
    Rejected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Line(String),
    EndOfStream,
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Reply(String),
    RunPull(Identity),
    Nothing,
}

impl SessionState {
    pub fn step(self, input: SessionInput, allow_list: &AllowList) -> (SessionState, SessionAction) {
        match (self, input) {
            (SessionState::AwaitingIdentity, SessionInput::Line(line)) => {
                match allow_list.verify(&line) {
                    Some(identity) => (
                        SessionState::Active { identity },
                        SessionAction::Reply(RECOGNISED.to_string()),
                    ),
                    None => (
                        SessionState::Rejected,
                        SessionAction::Reply(IDENTITY_REJECTED.to_string()),
                    ),
                }
            }
            (SessionState::AwaitingIdentity, SessionInput::EndOfStream) => (
                SessionState::Rejected,
                SessionAction::Reply(IDENTITY_REJECTED.to_string()),
            ),
            (SessionState::Active { identity }, SessionInput::Line(line)) => {
                match Command::parse(&line) {
                    Command::Exit => (SessionState::Closed, SessionAction::Nothing),
                    Command::PullRequest => (
                        SessionState::Active {
                            identity: identity.clone(),
                        },
                        SessionAction::RunPull(identity),
                    ),
                    Command::Unknown(_) => (
                        SessionState::Active { identity },
                        SessionAction::Reply(UNKNOWN_COMMAND.to_string()),
                    ),
                }
            }
            (SessionState::Active { .. }, SessionInput::EndOfStream)
            | (SessionState::Rejected, _)
            | (SessionState::Closed, _) => (SessionState::Closed, SessionAction::Nothing),
        }
    }

    /// No further input is read in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Rejected | SessionState::Closed)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Active { identity } => Some(identity),
            _ => None,
        }
    }
}

/// Drives one connection through the state machine.
pub struct ClientSession<R, W> {
    reader: R,
    writer: W,
    context: Arc<SessionContext>,
    state: SessionState,
}

impl<R, W> ClientSession<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, context: Arc<SessionContext>) -> Self {
        Self {
            reader,
            writer,
            context,
            state: SessionState::AwaitingIdentity,
        }
    }

    /// Serve until the client leaves, is rejected, fails, or `stop` fires.
    ///
    /// Always ends with the connection closed; returns the identity that was
    /// served, if the handshake succeeded.
    pub async fn run(mut self, mut stop: ShutdownSignal) -> Option<Identity> {
        let mut served = None;
        if let Err(err) = self.serve(&mut stop, &mut served).await {
            tracing::warn!(error = %err, "session ended with an error");
        }
        self.close().await;
        served
    }

    async fn serve(
        &mut self,
        stop: &mut ShutdownSignal,
        served: &mut Option<Identity>,
    ) -> Result<(), ServerError> {
        while !self.state.is_terminal() {
            let read = tokio::select! {
                _ = stop.wait() => None,
                line = read_line(&mut self.reader) => Some(line),
            };
            let input = match read {
                None => {
                    tracing::info!("session stopped by server shutdown");
                    self.state = SessionState::Closed;
                    return Ok(());
                }
                Some(line) => match line? {
                    Some(line) => SessionInput::Line(line),
                    None => SessionInput::EndOfStream,
                },
            };

            let current = std::mem::replace(&mut self.state, SessionState::Closed);
            let peer_left = input == SessionInput::EndOfStream;
            let (next, action) = current.step(input, &self.context.allow_list);
            self.state = next;

            match &self.state {
                SessionState::Active { identity } if served.is_none() => {
                    tracing::Span::current().record("identity", identity.as_str());
                    tracing::info!(identity = %identity, "client identity recognised");
                    *served = Some(identity.clone());
                }
                SessionState::Rejected => {
                    tracing::warn!("client identity not recognised; closing connection");
                }
                SessionState::Closed if !peer_left => tracing::info!("client is exiting"),
                SessionState::Closed => tracing::info!("client closed the connection"),
                _ => {}
            }

            match action {
                SessionAction::Reply(text) => {
                    let written = write_line(&mut self.writer, &text).await;
                    // A rejected peer may already be gone.
                    if self.state != SessionState::Rejected {
                        written.map_err(ServerError::Connection)?;
                    }
                }
                SessionAction::RunPull(identity) => {
                    tracing::info!(identity = %identity, "pull requested");
                    let outcome = self.context.executor.run_pull(&identity).await;
                    write_line(&mut self.writer, &outcome.wire_message())
                        .await
                        .map_err(ServerError::Connection)?;
                }
                SessionAction::Nothing => {}
            }
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    async fn close(mut self) {
        if let Err(err) = self.writer.shutdown().await {
            tracing::debug!(error = %err, "connection shutdown reported an error");
        }
        tracing::debug!("connection closed");
    }
}
