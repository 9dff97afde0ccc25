mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{client_config, eventually, Behaviour, FakeServer};
use pullsync_client::{
    establish, ClientError, ConnectionManager, ConnectionState, Established, PullFailure,
};
use pullsync_core::Identity;
use tokio::net::TcpListener;

async fn connected(server: &FakeServer) -> ConnectionManager {
    let connection = ConnectionManager::new();
    connection
        .connect(&server.addr.ip().to_string(), server.addr.port())
        .await
        .expect("connect");
    connection
}

#[tokio::test]
async fn handshake_accepts_recognised() {
    let server = FakeServer::start(Behaviour::default()).await;
    let connection = connected(&server).await;
    assert_eq!(connection.state(), ConnectionState::Handshaking);

    connection.handshake(&Identity::from("alice")).await.expect("recognised");
    assert_eq!(server.received(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn handshake_rejection_carries_server_response() {
    let server = FakeServer::start(Behaviour::default()).await;
    let connection = connected(&server).await;

    let err = connection.handshake(&Identity::from("mallory")).await.unwrap_err();
    match err {
        ClientError::IdentityRejected { response } => {
            assert_eq!(response, "Identity not recognised")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn pull_results_distinguish_failure_kinds() {
    let server = FakeServer::start(Behaviour {
        pull_reply: |n| match n {
            0 => Some("Succeeded".to_string()),
            1 => Some("The backup share could not be mounted".to_string()),
            _ => None,
        },
        ..Behaviour::default()
    })
    .await;
    let connection = connected(&server).await;
    connection.handshake(&Identity::from("alice")).await.unwrap();

    connection.send_pull_request().await.expect("first pull succeeds");

    let err = connection.send_pull_request().await.unwrap_err();
    assert!(!err.is_connection_lost());
    assert!(matches!(
        err,
        ClientError::PullFailed(PullFailure::Rejected(ref s)) if s == "The backup share could not be mounted"
    ));

    let err = connection.send_pull_request().await.unwrap_err();
    assert!(matches!(err, ClientError::PullFailed(PullFailure::ConnectionClosed)));
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    let err = connection.send_pull_request().await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn concurrent_commands_each_get_their_own_response() {
    let server = FakeServer::start(Behaviour {
        pull_reply: |n| Some(format!("reply {n}")),
        ..Behaviour::default()
    })
    .await;
    let connection = Arc::new(connected(&server).await);
    connection.handshake(&Identity::from("alice")).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let connection = Arc::clone(&connection);
        tasks.push(tokio::spawn(async move {
            connection.send_command("PullRequest").await.unwrap().unwrap()
        }));
    }
    let mut replies = BTreeSet::new();
    for task in tasks {
        replies.insert(task.await.unwrap());
    }
    let expected: BTreeSet<String> = (0..8).map(|n| format!("reply {n}")).collect();
    assert_eq!(replies, expected);
}

#[tokio::test]
async fn unknown_command_gets_unknown_reply() {
    let server = FakeServer::start(Behaviour::default()).await;
    let connection = connected(&server).await;
    connection.handshake(&Identity::from("alice")).await.unwrap();
    assert_eq!(
        connection.send_command("status").await.unwrap().as_deref(),
        Some("Unknown command")
    );
}

#[tokio::test]
async fn exit_then_close_is_idempotent() {
    let server = FakeServer::start(Behaviour::default()).await;
    let connection = Arc::new(connected(&server).await);
    connection.handshake(&Identity::from("alice")).await.unwrap();

    connection.send_exit().await.expect("exit sent");
    let (a, b) = (Arc::clone(&connection), Arc::clone(&connection));
    tokio::join!(a.close(), b.close());
    connection.close().await;

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(eventually(|| server.received().contains(&"exit".to_string())).await);
    assert!(matches!(
        connection.send_exit().await,
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn connect_failure_names_the_address() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let connection = ConnectionManager::new();
    let err = connection.connect("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectFailure { .. }));
    assert!(err.to_string().contains(&port.to_string()));
}

#[tokio::test]
async fn establish_converges_after_rejected_cycles() {
    let server = FakeServer::start(Behaviour {
        reject_first: 3,
        ..Behaviour::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let config = client_config(server.addr, dir.path());
    let connection = ConnectionManager::new();
    let (_trigger, mut shutdown) = pullsync_core::shutdown::channel();

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        establish(&connection, &config, &mut shutdown),
    )
    .await
    .expect("converges");

    assert_eq!(outcome, Established::Synced);
    assert_eq!(server.connections(), 4);
    assert_eq!(server.pulls(), 1, "initial full pull");
    assert_eq!(connection.state(), ConnectionState::Synced);
}

#[tokio::test]
async fn initial_pull_failure_still_counts_as_synced() {
    let server = FakeServer::start(Behaviour {
        pull_reply: |_| Some("The sync tool failed to pull the files".to_string()),
        ..Behaviour::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let config = client_config(server.addr, dir.path());
    let connection = ConnectionManager::new();
    let (_trigger, mut shutdown) = pullsync_core::shutdown::channel();

    assert_eq!(
        establish(&connection, &config, &mut shutdown).await,
        Established::Synced
    );
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn establish_is_cancelled_during_backoff() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let mut config = client_config(format!("127.0.0.1:{port}").parse().unwrap(), dir.path());
    config.retry_delay = Duration::from_secs(600);
    let connection = ConnectionManager::new();
    let (trigger, mut shutdown) = pullsync_core::shutdown::channel();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.trigger();
    });
    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        establish(&connection, &config, &mut shutdown),
    )
    .await
    .expect("cancelled promptly");
    canceller.await.unwrap();

    assert_eq!(outcome, Established::Cancelled);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn silent_server_times_out_the_handshake_and_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let acceptor = {
        let accepted = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        })
    };

    let dir = tempfile::tempdir().unwrap();
    let config = client_config(addr, dir.path());
    let connection = ConnectionManager::new().with_handshake_timeout(Duration::from_millis(100));
    let (trigger, mut shutdown) = pullsync_core::shutdown::channel();

    let establishing = establish(&connection, &config, &mut shutdown);
    let retried = async {
        assert!(eventually(|| accepted.load(Ordering::SeqCst) >= 3).await);
        trigger.trigger();
    };
    let (outcome, ()) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(establishing, retried)
    })
    .await
    .expect("handshake does not hang");

    assert_eq!(outcome, Established::Cancelled);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    acceptor.abort();
}

#[tokio::test]
async fn handshake_timeout_reports_a_lost_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let holder = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let connection = ConnectionManager::new().with_handshake_timeout(Duration::from_millis(100));
    connection.connect(&addr.ip().to_string(), addr.port()).await.unwrap();
    let err = connection.handshake(&Identity::from("alice")).await.unwrap_err();

    assert!(err.is_connection_lost(), "unexpected error: {err}");
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    holder.abort();
}

#[tokio::test]
async fn shutdown_during_initial_pull_still_sends_exit() {
    let server = FakeServer::start(Behaviour {
        hold_pulls: true,
        ..Behaviour::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let config = client_config(server.addr, dir.path());
    let connection = ConnectionManager::new();
    let (trigger, mut shutdown) = pullsync_core::shutdown::channel();

    let establishing = establish(&connection, &config, &mut shutdown);
    let interrupt = async {
        assert!(eventually(|| server.received().contains(&"PullRequest".to_string())).await);
        trigger.trigger();
    };
    let (outcome, ()) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(establishing, interrupt)
    })
    .await
    .expect("cancelled promptly");

    assert_eq!(outcome, Established::Cancelled);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(eventually(|| server.received().contains(&"exit".to_string())).await);
    assert_eq!(server.received(), vec!["alice", "PullRequest", "exit"]);
}
