//! Session registry: binds a session id to one live connection and at most
//! one in-flight generation task.
//!
//! All mutations go through one `tokio::sync::Mutex` around the session map.
//! Each session also owns a delivery gate. Every event send takes the gate
//! and re-checks the task's cancellation token first; superseding or
//! unregistering cancels the old token and then takes the same gate, so once
//! either returns no event from the old task can reach the connection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::pipeline::types::NoteEvent;

/// Capacity of the per-connection outgoing event channel.
pub const CONNECTION_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No connection for session {0}")]
    NoConnection(String),
}

// ═══════════════════════════════════════════════════════════
// Connection
// ═══════════════════════════════════════════════════════════

/// Sending half of one client connection.
///
/// The receiving half is drained by the transport (one writer task per
/// socket). Cloning shares the same underlying channel.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    tx: mpsc::Sender<NoteEvent>,
}

impl Connection {
    pub fn new(tx: mpsc::Sender<NoteEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Create a connection together with its receiving half.
    pub fn channel() -> (Self, mpsc::Receiver<NoteEvent>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

// ═══════════════════════════════════════════════════════════
// DeliveryHandle
// ═══════════════════════════════════════════════════════════

/// Outcome of one gated send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The task was cancelled; nothing was sent.
    Cancelled,
    /// The connection is gone; the event was discarded.
    Dropped,
}

/// What a generation task is given to talk to its session's connection.
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    session_id: Arc<str>,
    task_id: Uuid,
    connection: Connection,
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl DeliveryHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the task has been superseded, unregistered or shut down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Send one event unless the task has been cancelled.
    pub async fn deliver(&self, event: NoteEvent) -> Delivery {
        let _gate = self.gate.lock().await;
        if self.cancel.is_cancelled() {
            return Delivery::Cancelled;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Delivery::Cancelled,
            sent = self.connection.tx.send(event) => match sent {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Dropped,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════
// SessionRegistry
// ═══════════════════════════════════════════════════════════

struct ActiveTask {
    id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SessionEntry {
    connection: Option<Connection>,
    task: Option<ActiveTask>,
    gate: Arc<Mutex<()>>,
}

impl SessionEntry {
    fn is_empty(&self) -> bool {
        self.connection.is_none() && self.task.is_none()
    }
}

/// Cancel `task` and wait until no send of it is in flight.
async fn cancel_task(task: &ActiveTask, gate: &Mutex<()>) {
    task.cancel.cancel();
    let _gate = gate.lock().await;
}

/// Owns every session's connection and task handle.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` to `session_id`, returning the connection it replaced.
    ///
    /// An active task keeps running against the connection it started with.
    pub async fn register(&self, session_id: &str, connection: Connection) -> Option<Connection> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.entry(session_id.to_string()).or_default();
        let connection_id = connection.id;
        let previous = entry.connection.replace(connection);

        tracing::info!(
            session_id,
            %connection_id,
            replaced = previous.is_some(),
            "Connection registered"
        );
        previous
    }

    /// Remove the binding and cancel the active task. Returns `false` when
    /// nothing was bound.
    pub async fn unregister(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(entry) = sessions.remove(session_id) else {
            return false;
        };

        if let Some(task) = &entry.task {
            cancel_task(task, &entry.gate).await;
            tracing::info!(session_id, task_id = %task.id, "Active task cancelled on unregister");
        }
        tracing::info!(session_id, "Session unregistered");
        true
    }

    /// Unregister only if `connection_id` is still the bound connection.
    ///
    /// A socket that was replaced by a newer one must not tear down the
    /// newer binding when it finally closes.
    pub async fn disconnect_connection(&self, session_id: &str, connection_id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        let bound = sessions
            .get(session_id)
            .and_then(|e| e.connection.as_ref())
            .is_some_and(|c| c.id == connection_id);
        if !bound {
            tracing::debug!(session_id, %connection_id, "Stale connection closed, binding kept");
            return false;
        }

        if let Some(entry) = sessions.remove(session_id) {
            if let Some(task) = &entry.task {
                cancel_task(task, &entry.gate).await;
                tracing::info!(session_id, task_id = %task.id, "Active task cancelled on disconnect");
            }
        }
        tracing::info!(session_id, %connection_id, "Connection disconnected");
        true
    }

    pub async fn lookup_connection(&self, session_id: &str) -> Option<Connection> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .and_then(|e| e.connection.clone())
    }

    /// Cancel the session's current task (if any) and spawn a new one.
    ///
    /// `factory` receives the delivery handle for the new task and returns
    /// the future to run. The call returns once the task is spawned. Fails
    /// without starting anything when no connection is bound.
    pub async fn supersede_and_start<F, Fut>(
        self: &Arc<Self>,
        session_id: &str,
        factory: F,
    ) -> Result<Uuid, SessionError>
    where
        F: FnOnce(DeliveryHandle) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut sessions = self.sessions.lock().await;
        let no_connection = || SessionError::NoConnection(session_id.to_string());
        let entry = sessions.get_mut(session_id).ok_or_else(no_connection)?;
        let connection = entry.connection.clone().ok_or_else(no_connection)?;

        if let Some(old) = entry.task.take() {
            cancel_task(&old, &entry.gate).await;
            tracing::info!(session_id, task_id = %old.id, "Superseded active task");
        }

        let task_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let delivery = DeliveryHandle {
            session_id: Arc::from(session_id),
            task_id,
            connection,
            cancel: cancel.clone(),
            gate: entry.gate.clone(),
        };

        let fut = factory(delivery);
        let registry = Arc::clone(self);
        let owned_id = session_id.to_string();
        let handle = tokio::spawn(async move {
            fut.await;
            registry.finish(&owned_id, task_id).await;
        });

        entry.task = Some(ActiveTask {
            id: task_id,
            cancel,
            handle,
        });
        tracing::info!(session_id, %task_id, "Task started");
        Ok(task_id)
    }

    /// Clear the task binding if `task_id` is still the active task.
    async fn finish(&self, session_id: &str, task_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        let Some(entry) = sessions.get_mut(session_id) else {
            return;
        };
        if entry.task.as_ref().is_some_and(|t| t.id == task_id) {
            entry.task = None;
            tracing::debug!(session_id, %task_id, "Task finished");
        }
        if entry.is_empty() {
            sessions.remove(session_id);
        }
    }

    pub async fn has_active_task(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .is_some_and(|e| e.task.is_some())
    }

    pub async fn active_task_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|e| e.task.is_some())
            .count()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Cancel every active task and wait for them to stop.
    pub async fn shutdown(&self) {
        let tasks: Vec<(ActiveTask, Arc<Mutex<()>>)> = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .values_mut()
                .filter_map(|e| e.task.take().map(|t| (t, e.gate.clone())))
                .collect()
        };

        let count = tasks.len();
        for (task, gate) in &tasks {
            cancel_task(task, gate).await;
        }
        for (task, _) in tasks {
            let _ = task.handle.await;
        }
        tracing::info!(cancelled = count, "Session registry shut down");
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
