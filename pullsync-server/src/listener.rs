//! Accept loop and the server lifecycle around it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::Instrument;

use pullsync_core::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use pullsync_core::ServerConfig;

use crate::error::ServerError;
use crate::executor::PullExecutor;
use crate::registry::SessionRegistry;
use crate::session::{ClientSession, SessionContext};

/// A bound listening socket.
pub struct ServerListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ServerListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        tracing::info!(addr = %local_addr, "server socket created");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires, spawning one registered
    /// session per connection. The listening socket is closed on return.
    pub async fn run(
        self,
        registry: Arc<SessionRegistry>,
        context: Arc<SessionContext>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        loop {
            tracing::debug!("waiting for connection");
            let accepted = tokio::select! {
                _ = shutdown.wait() => None,
                accepted = self.listener.accept() => Some(accepted),
            };

            match accepted {
                None => break,
                Some(Ok((stream, peer))) => {
                    tracing::info!(peer = %peer, "new client connected");
                    spawn_session(&registry, &context, stream, peer);
                }
                Some(Err(_)) if shutdown.is_triggered() => break,
                Some(Err(err)) => {
                    tracing::error!(error = %err, "accept failed; listener stopping");
                    return Err(ServerError::Accept(err));
                }
            }
        }

        tracing::info!(addr = %self.local_addr, "closing server socket");
        Ok(())
    }
}

fn spawn_session(
    registry: &SessionRegistry,
    context: &Arc<SessionContext>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(error = %err, "could not disable nagle");
    }
    let context = Arc::clone(context);
    registry.spawn(move |id, stop| {
        let span = tracing::info_span!(
            "session",
            id,
            peer = %peer,
            identity = tracing::field::Empty,
        );
        async move {
            let (reader, writer) = stream.into_split();
            let session = ClientSession::new(BufReader::new(reader), writer, context);
            session.run(stop).await;
        }
        .instrument(span)
    });
}

/// A running server: accept loop plus its sessions.
pub struct Server {
    local_addr: SocketAddr,
    shutdown: ShutdownTrigger,
    registry: Arc<SessionRegistry>,
    listener_task: Option<JoinHandle<Result<(), ServerError>>>,
}

impl Server {
    /// Bind on all interfaces at the configured port and start accepting.
    pub async fn start(config: &ServerConfig) -> Result<Self, ServerError> {
        let context = SessionContext {
            allow_list: config.known_identities.clone(),
            executor: PullExecutor::from_config(config),
        };
        Self::start_with(config.bind_addr(), context).await
    }

    pub async fn start_with(addr: SocketAddr, context: SessionContext) -> Result<Self, ServerError> {
        let listener = ServerListener::bind(addr).await?;
        let local_addr = listener.local_addr();
        let (shutdown, signal) = shutdown::channel();
        let registry = Arc::new(SessionRegistry::new());

        let listener_task = tokio::spawn(listener.run(
            Arc::clone(&registry),
            Arc::new(context),
            signal,
        ));

        Ok(Self {
            local_addr,
            shutdown,
            registry,
            listener_task: Some(listener_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn session_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Resolves if the accept loop ends on its own (fatal accept error).
    /// Pending forever once it has been observed or the server is stopping.
    pub async fn listener_exited(&mut self) -> Result<(), ServerError> {
        let Some(task) = self.listener_task.as_mut() else {
            return std::future::pending().await;
        };
        let result = join_listener(task.await);
        self.listener_task = None;
        result
    }

    /// Close the listening socket, then stop and join every session.
    ///
    /// When this returns no session socket is open and the port no longer
    /// accepts connections.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        tracing::info!("stopping backup server");
        self.shutdown.trigger();
        let listener_result = match self.listener_task.take() {
            Some(task) => join_listener(task.await),
            None => Ok(()),
        };
        self.registry.shutdown().await;
        tracing::info!("backup server stopped");
        listener_result
    }
}

fn join_listener(
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(ServerError::Join {
            task: "listener",
            message: err.to_string(),
        }),
    }
}

/// Run a server until `stop` resolves or the listener fails, then shut it
/// down completely.
pub async fn serve_until<F>(config: &ServerConfig, stop: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let mut server = Server::start(config).await?;
    tracing::info!(
        addr = %server.local_addr(),
        clients = config.known_identities.len(),
        "backup server started",
    );

    let listener_failure = tokio::select! {
        _ = stop => None,
        result = server.listener_exited() => Some(result),
    };

    let stopped = server.stop().await;
    match listener_failure {
        Some(Err(err)) => Err(err),
        _ => stopped,
    }
}
