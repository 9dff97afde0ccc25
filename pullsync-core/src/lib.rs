//! pullsync core library: wire protocol, settings, logging, errors.
//!
//! Shared by the server and client crates:
//! - [`protocol`]: command tokens and the bounded line codec
//! - [`outcome`]: [`PullOutcome`], the exit-code table of the pull script
//! - [`identity`]: client identities and the server allow-list
//! - [`config`]: `key=value` settings file and typed role configs
//! - [`logging`] / [`log_rotation`]: console + file tracing output
//! - [`shutdown`]: cloneable shutdown signal

pub mod config;
pub mod error;
pub mod identity;
pub mod log_rotation;
pub mod logging;
pub mod outcome;
pub mod protocol;
pub mod shutdown;

pub use config::{ClientConfig, ServerConfig, Settings};
pub use error::{ConfigError, LineError};
pub use identity::{AllowList, Identity};
pub use outcome::PullOutcome;
pub use protocol::Command;
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
