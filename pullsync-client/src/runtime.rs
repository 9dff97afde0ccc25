use pullsync_core::{ClientConfig, ShutdownSignal};

use crate::connection::ConnectionManager;
use crate::reconnect::{self, Established};
use crate::watcher::{DirectoryWatcher, WatchEnd};

/// Drive the client until `shutdown` fires: establish a session, watch the
/// directory, and start over whenever the connection or the directory is
/// lost. On shutdown the server is sent `exit` and the socket is closed.
pub async fn run_client(config: ClientConfig, shutdown: ShutdownSignal) {
    let connection = ConnectionManager::new();
    run_with(&connection, &config, shutdown).await;
}

/// As [`run_client`], over a caller-owned connection so its state can be
/// observed.
pub async fn run_with(
    connection: &ConnectionManager,
    config: &ClientConfig,
    mut shutdown: ShutdownSignal,
) {
    tracing::info!(
        identity = %config.identity,
        server = %format!("{}:{}", config.server_host, config.port),
        dir = %config.watch_dir.display(),
        "backup client starting",
    );
    let watcher = DirectoryWatcher::new(&config.watch_dir, config.settle_window);

    loop {
        match reconnect::establish(connection, config, &mut shutdown).await {
            Established::Synced => {}
            Established::Cancelled => break,
        }

        match watcher.watch(connection, &mut shutdown).await {
            WatchEnd::Shutdown => break,
            WatchEnd::ConnectionLost => {
                connection.close().await;
            }
            WatchEnd::TargetInvalid => {
                connection.leave().await;
                if reconnect::backoff(config.retry_delay, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    connection.leave().await;
    tracing::info!("backup client stopped");
}
