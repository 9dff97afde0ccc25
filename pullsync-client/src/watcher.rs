//! Turns filesystem activity under the watched directory into pull requests.

use std::path::PathBuf;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use pullsync_core::ShutdownSignal;

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::ClientError;

/// Why a watch stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    Shutdown,
    /// The directory vanished, could not be watched, or the watcher failed.
    TargetInvalid,
    ConnectionLost,
}

pub struct DirectoryWatcher {
    dir: PathBuf,
    settle: Duration,
}

#[derive(Debug, Default)]
struct Batch {
    changes: usize,
    errors: usize,
}

impl Batch {
    fn record(&mut self, event: notify::Result<Event>) {
        match event {
            Ok(event) if is_relevant(&event.kind) => {
                tracing::trace!(kind = ?event.kind, paths = ?event.paths, "change observed");
                self.changes += 1;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "watcher event error");
                self.errors += 1;
            }
        }
    }
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, settle: Duration) -> Self {
        Self {
            dir: dir.into(),
            settle,
        }
    }

    /// Watch until shutdown, loss of the directory, or loss of the
    /// connection. Each settled batch of changes produces one pull request.
    ///
    /// The OS watch is released when this returns.
    pub async fn watch(
        &self,
        connection: &ConnectionManager,
        shutdown: &mut ShutdownSignal,
    ) -> WatchEnd {
        let (_watcher, mut events) = match self.arm() {
            Ok(armed) => armed,
            Err(err) => {
                tracing::error!(dir = %self.dir.display(), error = %err, "could not watch directory");
                return WatchEnd::TargetInvalid;
            }
        };
        connection.set_state(ConnectionState::Watching);
        tracing::info!(dir = %self.dir.display(), "watching for changes");

        loop {
            let first = tokio::select! {
                _ = shutdown.wait() => return WatchEnd::Shutdown,
                event = events.recv() => event,
            };
            let Some(first) = first else {
                tracing::error!("file watcher stopped delivering events");
                return WatchEnd::TargetInvalid;
            };

            let mut batch = Batch::default();
            batch.record(first);
            tokio::select! {
                _ = shutdown.wait() => return WatchEnd::Shutdown,
                _ = tokio::time::sleep(self.settle) => {}
            }
            while let Ok(event) = events.try_recv() {
                batch.record(event);
            }

            if batch.errors > 0 || !self.dir.is_dir() {
                tracing::error!(dir = %self.dir.display(), "watched directory is no longer valid");
                return WatchEnd::TargetInvalid;
            }
            if batch.changes == 0 {
                continue;
            }

            tracing::info!(changes = batch.changes, "changes detected; requesting pull");
            let result = tokio::select! {
                _ = shutdown.wait() => return WatchEnd::Shutdown,
                result = connection.send_pull_request() => result,
            };
            match result {
                Ok(()) => tracing::info!("pull succeeded"),
                Err(err) if err.is_connection_lost() => {
                    tracing::warn!(error = %err, "connection lost while requesting pull");
                    return WatchEnd::ConnectionLost;
                }
                Err(err) => tracing::warn!(error = %err, "pull failed"),
            }
        }
    }

    fn arm(
        &self,
    ) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<notify::Result<Event>>), ClientError>
    {
        if !self.dir.is_dir() {
            return Err(ClientError::WatchTarget {
                path: self.dir.clone(),
            });
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&self.dir, RecursiveMode::Recursive)?;
        Ok((watcher, event_rx))
    }
}

/// Creation, modification and removal count; access does not.
fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
