//! Tracks live sessions so shutdown can stop and join every one of them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use pullsync_core::shutdown::{self, ShutdownSignal, ShutdownTrigger};

struct SessionHandle {
    stop: ShutdownTrigger,
    task: JoinHandle<()>,
}

type SessionMap = HashMap<u64, SessionHandle>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<SessionMap>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a session task and register it.
    ///
    /// `make` receives the session id and the stop signal the registry will
    /// fire on shutdown. The entry is removed when the task finishes. A
    /// session spawned after [`shutdown`](Self::shutdown) starts already
    /// stopped.
    pub fn spawn<F, Fut>(&self, make: F) -> u64
    where
        F: FnOnce(u64, ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (stop, signal) = shutdown::channel();
        if self.closed.load(Ordering::SeqCst) {
            stop.trigger();
        }

        let session = make(id, signal);
        let sessions = Arc::clone(&self.sessions);

        // Held across spawn so the task cannot deregister before it is inserted.
        let mut guard = lock(&self.sessions);
        let task = tokio::spawn(async move {
            let _deregister = Deregister { sessions, id };
            session.await;
        });
        guard.insert(id, SessionHandle { stop, task });
        id
    }

    pub fn active_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Signal every registered session and wait for all of them to finish.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<(u64, SessionHandle)> = lock(&self.sessions).drain().collect();
        if drained.is_empty() {
            return;
        }

        tracing::info!(sessions = drained.len(), "stopping client sessions");
        for (_, handle) in &drained {
            handle.stop.trigger();
        }
        for (id, handle) in drained {
            if let Err(err) = handle.task.await {
                tracing::error!(session = id, error = %err, "session task join failure");
            }
        }
    }
}

/// Removes a session's entry when its task ends, including by panic.
struct Deregister {
    sessions: Arc<Mutex<SessionMap>>,
    id: u64,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        lock(&self.sessions).remove(&self.id);
    }
}

fn lock(sessions: &Mutex<SessionMap>) -> MutexGuard<'_, SessionMap> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}
