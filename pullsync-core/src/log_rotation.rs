//! Size-based rotation of the log file.
//!
//! Runs once at process start, before the file is opened for appending:
//! `log` → `log.1` → `log.2` … up to [`RotationPolicy::keep`] copies.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 10 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_KEEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            keep: DEFAULT_KEEP,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log_path` if it has reached `max_bytes`.
    ///
    /// Returns `Ok(false)` when the file is below the threshold or missing.
    pub fn rotate(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.keep == 0 {
            return Ok(false);
        }

        remove_if_present(&backup_path(log_path, self.keep))?;
        for n in (1..self.keep).rev() {
            let from = backup_path(log_path, n);
            if from.exists() {
                fs::rename(&from, backup_path(log_path, n + 1))?;
            }
        }
        fs::rename(log_path, backup_path(log_path, 1))?;
        Ok(true)
    }
}

/// `log` + `n` → `log.n`.
pub fn backup_path(log_path: &Path, n: usize) -> PathBuf {
    let mut name = log_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "log".into());
    name.push(format!(".{n}"));
    log_path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
