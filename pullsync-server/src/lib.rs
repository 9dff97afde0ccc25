//! Backup server: accepts client connections, verifies identities and runs
//! the pull script on request.

mod error;
pub mod executor;
pub mod listener;
pub mod registry;
pub mod runner;
pub mod session;

pub use error::ServerError;
pub use executor::PullExecutor;
pub use listener::{serve_until, Server, ServerListener};
pub use registry::SessionRegistry;
pub use runner::{CommandOutput, CommandRunner, ShellCommandRunner};
pub use session::{ClientSession, SessionAction, SessionContext, SessionInput, SessionState};
