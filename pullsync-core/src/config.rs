//! Settings file reader and the typed configuration of each role.
//!
//! # File format
//!
//! ```text
//! # comment
//! port=10008
//! knownClientIdentities=alice,bob
//! ```
//!
//! Lines starting with `#` or without `=` are ignored. The key is the trimmed
//! text before the first `=` and must be a single word; the value is the
//! trimmed remainder. A repeated key overrides the earlier value.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{invalid_value, ConfigError};
use crate::identity::{AllowList, Identity};

pub const DEFAULT_SERVER_CONFIG: &str = "./serverConfig";
pub const DEFAULT_CLIENT_CONFIG: &str = "./clientConfig";
pub const DEFAULT_LOG_FILE: &str = "./log";

/// Client reconnect backoff when `timeoutLength` is absent (10 minutes).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(600_000);
/// Quiet period after the first filesystem event of a batch.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(500);

pub mod keys {
    pub const PORT: &str = "port";
    pub const SERVER_IP: &str = "serverIP";
    pub const IDENTITY: &str = "identity";
    pub const KNOWN_CLIENT_IDENTITIES: &str = "knownClientIdentities";
    pub const DIRECTORY_TO_WATCH: &str = "directoryToWatch";
    pub const RSYNC_PULL_SCRIPT_PATH: &str = "rsyncPullScriptPath";
    pub const SEND_MAIL_SCRIPT_PATH: &str = "sendMailScriptPath";
    pub const TIMEOUT_LENGTH: &str = "timeoutLength";
    pub const WATCH_SETTLE_MS: &str = "watchSettleMs";
    pub const LOG_FILE_PATH: &str = "logFilePath";
}

// ---------------------------------------------------------------------------
// 1. Raw settings
// ---------------------------------------------------------------------------

/// Raw key/value pairs from a settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let mut values = HashMap::new();
        for line in contents.lines() {
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                continue;
            }
            values.insert(key.to_string(), value.trim().to_string());
        }
        Self { values }
    }

    /// Mandatory lookup.
    pub fn get(&self, key: &str) -> Result<&str, ConfigError> {
        self.get_optional(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Optional lookup; an empty value counts as absent.
    pub fn get_optional(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn port(&self) -> Result<u16, ConfigError> {
        let raw = self.get(keys::PORT)?;
        match raw.parse::<u16>() {
            Ok(0) => Err(invalid_value(keys::PORT, raw, "port must be between 1 and 65535")),
            Ok(port) => Ok(port),
            Err(_) => Err(invalid_value(keys::PORT, raw, "the port number was not a number")),
        }
    }

    fn millis_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get_optional(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| invalid_value(key, raw, "expected a whole number of milliseconds")),
        }
    }

    fn log_file(&self) -> PathBuf {
        PathBuf::from(
            self.get_optional(keys::LOG_FILE_PATH)
                .unwrap_or(DEFAULT_LOG_FILE),
        )
    }
}

// ---------------------------------------------------------------------------
// 2. Server
// ---------------------------------------------------------------------------

/// Everything the server needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub known_identities: AllowList,
    pub pull_script: PathBuf,
    pub notify_script: Option<PathBuf>,
    pub log_file: PathBuf,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_settings(&Settings::from_file(path)?)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let port = settings.port()?;

        let raw_identities = settings.get(keys::KNOWN_CLIENT_IDENTITIES)?;
        let known_identities = AllowList::parse(raw_identities);
        if known_identities.is_empty() {
            return Err(invalid_value(
                keys::KNOWN_CLIENT_IDENTITIES,
                raw_identities,
                "no client identities listed",
            ));
        }

        Ok(Self {
            port,
            known_identities,
            pull_script: PathBuf::from(settings.get(keys::RSYNC_PULL_SCRIPT_PATH)?),
            notify_script: settings
                .get_optional(keys::SEND_MAIL_SCRIPT_PATH)
                .map(PathBuf::from),
            log_file: settings.log_file(),
        })
    }

    /// The server listens on every interface.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

// ---------------------------------------------------------------------------
// 3. Client
// ---------------------------------------------------------------------------

/// Everything the client needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_host: String,
    pub port: u16,
    pub identity: Identity,
    pub watch_dir: PathBuf,
    pub retry_delay: Duration,
    pub settle_window: Duration,
    pub log_file: PathBuf,
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_settings(&Settings::from_file(path)?)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            server_host: settings.get(keys::SERVER_IP)?.to_string(),
            port: settings.port()?,
            identity: Identity::from(settings.get(keys::IDENTITY)?),
            watch_dir: PathBuf::from(settings.get(keys::DIRECTORY_TO_WATCH)?),
            retry_delay: settings.millis_or(keys::TIMEOUT_LENGTH, DEFAULT_RETRY_DELAY)?,
            settle_window: settings.millis_or(keys::WATCH_SETTLE_MS, DEFAULT_SETTLE_WINDOW)?,
            log_file: settings.log_file(),
        })
    }
}
