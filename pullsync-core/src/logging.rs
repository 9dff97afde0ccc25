//! Console + log file output.
//!
//! [`build`] assembles a [`Dispatch`] from configuration; the binary decides
//! where it is installed. Nothing in the library crates prints directly.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::log_rotation::RotationPolicy;

/// Where log output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Console and the given file.
    ConsoleAndFile,
    /// Console only; the file could not be opened.
    ConsoleOnly { reason: String },
}

/// Build a dispatcher writing to stdout and, when possible, appending to
/// `log_file`. The file is rotated first according to `policy`.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn build(log_file: &Path, policy: RotationPolicy) -> (Dispatch, LogTarget) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let rotation_note = policy.rotate(log_file).err();
    let (file_layer, target) = match open_append(log_file) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            LogTarget::ConsoleAndFile,
        ),
        Err(err) => (
            None,
            LogTarget::ConsoleOnly {
                reason: format!("cannot open log file {}: {err}", log_file.display()),
            },
        ),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer);
    let dispatch = Dispatch::new(subscriber);

    if let Some(err) = rotation_note {
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!(path = %log_file.display(), error = %err, "log rotation failed");
        });
    }
    (dispatch, target)
}

/// Build and install as the process-wide default. Returns where output goes.
///
/// A second call is a no-op apart from the returned target.
pub fn install(log_file: &Path) -> LogTarget {
    let (dispatch, target) = build(log_file, RotationPolicy::default());
    let _ = tracing::dispatcher::set_global_default(dispatch);
    if let LogTarget::ConsoleOnly { reason } = &target {
        tracing::warn!("{reason}; logging to the console only");
    }
    target
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn events_reach_the_log_file() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("server.log");
        let (dispatch, target) = build(&log, RotationPolicy::default());
        assert_eq!(target, LogTarget::ConsoleAndFile);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(identity = "alice", "handshake accepted");
        });

        let written = std::fs::read_to_string(&log).unwrap();
        assert!(written.contains("handshake accepted"), "got: {written}");
        assert!(written.contains("alice"));
    }

    #[test]
    fn unwritable_log_path_falls_back_to_console() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let (_dispatch, target) = build(dir.path(), RotationPolicy::default());
        assert!(matches!(target, LogTarget::ConsoleOnly { .. }));
    }

    #[test]
    fn existing_content_is_appended_not_truncated() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("log");
        std::fs::write(&log, "previous run\n").unwrap();
        let (dispatch, _) = build(&log, RotationPolicy::default());
        tracing::dispatcher::with_default(&dispatch, || tracing::info!("next run"));
        let written = std::fs::read_to_string(&log).unwrap();
        assert!(written.starts_with("previous run\n"));
        assert!(written.contains("next run"));
    }
}
