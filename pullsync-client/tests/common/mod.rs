//! A scripted line server standing in for the real backup server.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone, Copy)]
pub struct Behaviour {
    pub identity: &'static str,
    /// Reject this many handshakes before recognising the identity.
    pub reject_first: usize,
    /// Reply to the n-th pull request; `None` drops the connection.
    pub pull_reply: fn(usize) -> Option<String>,
    /// Read pull requests but never answer them.
    pub hold_pulls: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            identity: "alice",
            reject_first: 0,
            pull_reply: |_| Some("Succeeded".to_string()),
            hold_pulls: false,
        }
    }
}

pub struct FakeServer {
    pub addr: SocketAddr,
    pub lines: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    pulls: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let pulls = Arc::new(AtomicUsize::new(0));

        let task = {
            let lines = Arc::clone(&lines);
            let connections = Arc::clone(&connections);
            let pulls = Arc::clone(&pulls);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let nth = connections.fetch_add(1, Ordering::SeqCst);
                    let lines = Arc::clone(&lines);
                    let pulls = Arc::clone(&pulls);
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut reader = BufReader::new(read).lines();

                        let Ok(Some(identity)) = reader.next_line().await else {
                            return;
                        };
                        lines.lock().unwrap().push(identity.clone());
                        if identity != behaviour.identity || nth < behaviour.reject_first {
                            let _ = write.write_all(b"Identity not recognised\n").await;
                            return;
                        }
                        let _ = write.write_all(b"Recognised\n").await;

                        while let Ok(Some(line)) = reader.next_line().await {
                            lines.lock().unwrap().push(line.clone());
                            let reply = match line.as_str() {
                                "exit" => return,
                                "PullRequest" if behaviour.hold_pulls => continue,
                                "PullRequest" => {
                                    let n = pulls.fetch_add(1, Ordering::SeqCst);
                                    match (behaviour.pull_reply)(n) {
                                        Some(reply) => reply,
                                        None => return,
                                    }
                                }
                                _ => "Unknown command".to_string(),
                            };
                            if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    });
                }
            })
        };

        Self {
            addr,
            lines,
            connections,
            pulls,
            task,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn client_config(addr: SocketAddr, watch_dir: &std::path::Path) -> pullsync_core::ClientConfig {
    pullsync_core::ClientConfig {
        server_host: addr.ip().to_string(),
        port: addr.port(),
        identity: "alice".into(),
        watch_dir: watch_dir.to_path_buf(),
        retry_delay: Duration::from_millis(50),
        settle_window: Duration::from_millis(200),
        log_file: watch_dir.join("client.log"),
    }
}
