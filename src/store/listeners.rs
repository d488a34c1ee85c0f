//! Live-connection registry for the in-memory store.

use super::{ErrorCallback, SnapshotCallback};
use crate::types::Target;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a live connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenId(pub u64);

/// Callbacks of one connection, shared with queued delivery tasks.
#[derive(Clone)]
pub(crate) struct ListenerSink {
    pub id: ListenId,
    pub target: Target,
    pub active: Arc<AtomicBool>,
    on_next: Arc<Mutex<SnapshotCallback>>,
    on_error: Arc<Mutex<Option<ErrorCallback>>>,
}

impl ListenerSink {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Deliver a snapshot unless the connection was closed in the meantime.
    pub fn deliver(&self, snapshot: crate::types::Snapshot) {
        if !self.is_active() {
            tracing::trace!(id = self.id.0, "dropping delivery for closed listener");
            return;
        }
        let mut on_next = self.on_next.lock();
        (&mut **on_next)(snapshot);
    }

    /// Terminate the connection with an error. Runs at most once.
    pub fn fail(&self, error: crate::error::StoreError) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let on_error = self.on_error.lock().take();
        if let Some(on_error) = on_error {
            on_error(error);
        }
    }
}

/// Tracks open connections by id.
pub struct ListenerManager {
    listeners: RwLock<HashMap<ListenId, ListenerSink>>,
    next_id: AtomicU64,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(
        &self,
        target: Target,
        on_next: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> ListenerSink {
        let id = ListenId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let sink = ListenerSink {
            id,
            target,
            active: Arc::new(AtomicBool::new(true)),
            on_next: Arc::new(Mutex::new(on_next)),
            on_error: Arc::new(Mutex::new(Some(on_error))),
        };
        self.listeners.write().insert(id, sink.clone());
        sink
    }

    /// Close a connection. Queued deliveries for it are discarded.
    pub fn unregister(&self, id: ListenId) {
        if let Some(sink) = self.listeners.write().remove(&id) {
            sink.active.store(false, Ordering::SeqCst);
            tracing::debug!(id = id.0, "listener removed");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Active connections whose target passes `filter`, in id order.
    pub(crate) fn matching<F>(&self, filter: F) -> Vec<ListenerSink>
    where
        F: Fn(&Target) -> bool,
    {
        let mut sinks: Vec<ListenerSink> = self
            .listeners
            .read()
            .values()
            .filter(|sink| sink.is_active() && filter(&sink.target))
            .cloned()
            .collect();
        sinks.sort_by_key(|sink| sink.id);
        sinks
    }
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}
