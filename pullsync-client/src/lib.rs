//! Backup client: keeps a session with the server alive and requests a pull
//! whenever the watched directory changes.

mod error;
pub mod connection;
pub mod reconnect;
pub mod runtime;
pub mod watcher;

pub use connection::{ConnectionManager, ConnectionState};
pub use error::{ClientError, PullFailure};
pub use reconnect::{establish, Established};
pub use runtime::{run_client, run_with};
pub use watcher::{DirectoryWatcher, WatchEnd};
