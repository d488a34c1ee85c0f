//! The reactive document store seam.
//!
//! The caches consume exactly the primitives on [`ReactiveStore`]: one-shot
//! get, live listen, write, and canonical-path introspection. Results always
//! arrive through callbacks, never from inside the call that started them.
//!
//! [`InMemoryStore`] is a complete implementation driven by the crate's
//! [`EventLoop`](crate::runtime::EventLoop).

mod listeners;
mod memory;
mod query;

pub use listeners::{ListenId, ListenerManager};
pub use memory::{AccessPolicy, AccessRequest, AllowAll, InMemoryStore, PathRules, StoreConfig};
pub use query::{compare_values, evaluate_query, matches_source};

use crate::error::StoreError;
use crate::types::{DocumentRef, DocumentSnapshot, Snapshot, Target, Timestamp, WriteOp};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Called with every snapshot a live connection pushes.
pub type SnapshotCallback = Box<dyn FnMut(Snapshot) + Send>;

/// Called at most once when a live connection terminates with an error.
pub type ErrorCallback = Box<dyn FnOnce(StoreError) + Send>;

/// Called once when a write is acknowledged or rejected.
pub type WriteCallback = Box<dyn FnOnce(Result<(), StoreError>) + Send>;

/// Called once with the result of a one-shot read.
pub type GetCallback = Box<dyn FnOnce(Result<DocumentSnapshot, StoreError>) + Send>;

/// A push-based document database.
pub trait ReactiveStore: Send + Sync {
    /// Read a document once.
    fn get_document(&self, doc: &DocumentRef, on_complete: GetCallback);

    /// Open a live connection. `on_next` runs for the initial snapshot and
    /// every change after it; `on_error` ends the connection.
    fn listen(
        &self,
        target: &Target,
        on_next: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> ListenRegistration;

    /// Apply a write. Completion is reported through `on_complete`.
    fn write(&self, doc: &DocumentRef, op: WriteOp, on_complete: WriteCallback);

    /// Canonical path of a target, as used in diagnostics.
    fn canonical_path(&self, target: &Target) -> Result<String, StoreError> {
        Ok(target.canonical_path())
    }

    /// Fresh id for a document created without one.
    fn new_document_id(&self) -> String {
        auto_id(AUTO_ID_LENGTH)
    }
}

/// Default length of generated document ids.
pub const AUTO_ID_LENGTH: usize = 20;

static AUTO_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hex id derived from a process-wide counter and the current time.
pub fn auto_id(len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(AUTO_ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(Timestamp::now().0.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(len.min(64));
    id
}

/// Handle to a live connection. Removing it stops further deliveries.
///
/// `remove` is idempotent, and dropping the handle removes it.
pub struct ListenRegistration {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenRegistration {
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// A registration with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            remove: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove.lock().is_some()
    }

    pub fn remove(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }
}

impl Drop for ListenRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for ListenRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}
