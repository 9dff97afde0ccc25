//! Connect, handshake and initial pull, retried until it works or the
//! client is told to stop.

use std::time::Duration;

use pullsync_core::{ClientConfig, ShutdownSignal};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Established {
    /// Connected, recognised, initial pull answered.
    Synced,
    /// Shutdown was requested before a connection could be established.
    Cancelled,
}

/// Retry [`attempt`] once per backoff interval, without limit.
pub async fn establish(
    connection: &ConnectionManager,
    config: &ClientConfig,
    shutdown: &mut ShutdownSignal,
) -> Established {
    let mut failures: u64 = 0;
    loop {
        if shutdown.is_triggered() {
            return Established::Cancelled;
        }

        let result = tokio::select! {
            _ = shutdown.wait() => None,
            result = attempt(connection, config) => Some(result),
        };
        match result {
            None => {
                connection.leave().await;
                return Established::Cancelled;
            }
            Some(Ok(())) => {
                if failures > 0 {
                    tracing::info!(failures, "connection re-established");
                }
                return Established::Synced;
            }
            Some(Err(err)) => {
                failures += 1;
                connection.close().await;
                tracing::error!(error = %err, attempt = failures, "could not establish a session with the server");
            }
        }

        if backoff(config.retry_delay, shutdown).await {
            return Established::Cancelled;
        }
    }
}

/// One connection cycle: connect, identify, request the initial full pull.
///
/// A pull the server answers with a failure sentence still counts as
/// synced; only a lost connection fails the attempt.
pub async fn attempt(
    connection: &ConnectionManager,
    config: &ClientConfig,
) -> Result<(), ClientError> {
    connection.connect(&config.server_host, config.port).await?;
    connection.handshake(&config.identity).await?;

    match connection.send_pull_request().await {
        Ok(()) => tracing::info!("initial pull succeeded"),
        Err(err) if err.is_connection_lost() => return Err(err),
        Err(err) => tracing::warn!(error = %err, "initial pull failed"),
    }
    connection.set_state(ConnectionState::Synced);
    Ok(())
}

/// Sleep for `delay` with a visible wait message. Returns true if shutdown
/// interrupted the wait.
pub async fn backoff(delay: Duration, shutdown: &mut ShutdownSignal) -> bool {
    tracing::warn!("waiting {} before trying again", humanize(delay));
    tokio::select! {
        _ = shutdown.wait() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

fn humanize(delay: Duration) -> String {
    let secs = delay.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minute(s)", secs / 60)
    } else if secs > 0 {
        format!("{secs} second(s)")
    } else {
        format!("{} ms", delay.as_millis())
    }
}
