//! Newline-delimited text protocol shared by server and client.
//!
//! ```text
//! client → server   <identity>
//! server → client   Recognised | <rejection sentence>
//! client → server   PullRequest | exit | <anything else>
//! server → client   Succeeded | <failure sentence> | Unknown command
//! ```
//!
//! `exit` gets no response; the server closes the connection after it.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::LineError;

/// Handshake success token.
pub const RECOGNISED: &str = "Recognised";
/// Pull success token.
pub const SUCCEEDED: &str = "Succeeded";
/// Reply to any command the server does not understand.
pub const UNKNOWN_COMMAND: &str = "Unknown command";
/// Reply to an identity outside the allow-list.
pub const IDENTITY_REJECTED: &str = "Identity not recognised";

pub const EXIT: &str = "exit";
pub const PULL_REQUEST: &str = "PullRequest";

/// Longest accepted line, excluding the terminator.
pub const MAX_LINE_BYTES: usize = 4096;

/// A command line sent by the client after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    PullRequest,
    Unknown(String),
}

impl Command {
    /// Commands are matched exactly; surrounding whitespace is significant.
    pub fn parse(line: &str) -> Self {
        match line {
            EXIT => Command::Exit,
            PULL_REQUEST => Command::PullRequest,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Command::Exit => EXIT,
            Command::PullRequest => PULL_REQUEST,
            Command::Unknown(text) => text,
        }
    }
}

/// Read one line of at most [`MAX_LINE_BYTES`].
///
/// Returns `Ok(None)` on a clean end-of-stream before any byte of a new line.
/// A final line without a terminator is returned as-is. `\r\n` and `\n` are
/// both accepted; invalid UTF-8 is replaced lossily.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, LineError>
where
    R: AsyncBufRead + Unpin,
{
    read_line_bounded(reader, MAX_LINE_BYTES).await
}

pub async fn read_line_bounded<R>(reader: &mut R, limit: usize) -> Result<Option<String>, LineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }

        match available.iter().position(|b| *b == b'\n') {
            Some(end) => {
                buf.extend_from_slice(&available[..end]);
                reader.consume(end + 1);
                break;
            }
            None => {
                let taken = available.len();
                buf.extend_from_slice(available);
                reader.consume(taken);
            }
        }

        // One extra byte of slack for a trailing '\r'.
        if buf.len() > limit + 1 {
            return Err(LineError::TooLong { limit });
        }
    }

    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > limit {
        return Err(LineError::TooLong { limit });
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Write `line` followed by `\n` and flush.
pub async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
