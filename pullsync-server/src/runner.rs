//! External command execution.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{io_err, ServerError};

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output and standard error, interleaved line by line in
    /// arrival order.
    pub output: String,
}

/// Runs a command to completion. `argv[0]` is the program.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, argv: &[String]) -> Result<CommandOutput, ServerError>;
}

/// Spawns real processes. Stdin is null; the process is killed if the
/// future is dropped before it exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCommandRunner;

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn execute(&self, argv: &[String]) -> Result<CommandOutput, ServerError> {
        let (program, args) = argv.split_first().ok_or(ServerError::EmptyCommand)?;
        tracing::info!(command = %argv.join(" "), "executing command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| io_err(program, e))?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(stdout, line_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr, line_tx.clone())));
        }
        drop(line_tx);

        let mut output = String::new();
        while let Some(line) = line_rx.recv().await {
            output.push_str(&line);
            output.push('\n');
        }
        for forwarder in forwarders {
            let _ = forwarder.await;
        }

        let status = child.wait().await.map_err(|e| io_err(program, e))?;
        tracing::debug!(status = %status, bytes = output.len(), "command finished");
        Ok(CommandOutput {
            exit_code: status.code(),
            output,
        })
    }
}

async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
                if tx.send(line.to_string()).is_err() {
                    break;
                }
            }
        }
    }
}
