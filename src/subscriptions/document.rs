//! Live view of a single document.

use super::cell::{report, LiveCell, Transition};
use super::types::{DocumentState, LiveState, Observer, ObserverId};
use crate::channel::ErrorChannel;
use crate::error::StoreError;
use crate::permission::{ErrorFactory, SecurityRuleContext};
use crate::store::ReactiveStore;
use crate::types::{DocumentRef, Operation, Snapshot, Target, WithId};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Keeps one live connection to a document and exposes its latest value.
///
/// Changing the target closes the old connection before the new one opens;
/// anything the old connection delivers afterwards is discarded. Dropping the
/// cache closes it.
pub struct DocumentCache<T> {
    store: Arc<dyn ReactiveStore>,
    channel: Arc<ErrorChannel>,
    errors: ErrorFactory,
    cell: LiveCell<WithId<T>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> DocumentCache<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<dyn ReactiveStore>,
        channel: Arc<ErrorChannel>,
        errors: ErrorFactory,
    ) -> Self {
        Self {
            store,
            channel,
            errors,
            cell: LiveCell::new(),
            _record: PhantomData,
        }
    }

    /// Point the cache at `target` and return the state right after.
    ///
    /// `None` means "no subscription": the state is idle and nothing is
    /// opened. Passing the same document again keeps the existing connection.
    pub fn subscribe(&self, target: Option<&DocumentRef>) -> DocumentState<T> {
        let Some(doc) = target else {
            self.cell.retarget(None, LiveState::idle());
            return self.state();
        };

        let target = Target::Document(doc.clone());
        let ticket = match self.cell.retarget(Some(target.signature()), LiveState::loading()) {
            Transition::Opened(ticket) => ticket,
            Transition::Unchanged | Transition::Cleared => return self.state(),
        };
        let path = doc.path().canonical_string();
        tracing::debug!(path = %path, "opening document subscription");

        let on_next = {
            let cell = self.cell.downgrade();
            let errors = self.errors.clone();
            let path = path.clone();
            Box::new(move |snapshot: Snapshot| {
                let Some(cell) = cell.upgrade() else {
                    return;
                };
                let Snapshot::Document(snapshot) = snapshot else {
                    tracing::warn!(path = %path, "document subscription received a query snapshot");
                    return;
                };
                let decoded = snapshot
                    .data
                    .as_ref()
                    .map(|fields| WithId::<T>::decode(snapshot.id(), fields))
                    .transpose();
                match decoded {
                    Ok(data) => {
                        cell.apply(ticket, |state| state.set_ready(data));
                    }
                    Err(e) => {
                        if !cell.is_current(ticket) {
                            return;
                        }
                        let error = errors
                            .decode(SecurityRuleContext::new(Operation::Get, path.as_str()), e.to_string())
                            .into_shared();
                        cell.apply(ticket, |state| state.set_error(error));
                    }
                }
            })
        };

        let on_error = {
            let cell = self.cell.downgrade();
            let errors = self.errors.clone();
            let channel = Arc::clone(&self.channel);
            Box::new(move |e: StoreError| {
                let Some(cell) = cell.upgrade() else {
                    return;
                };
                if !cell.is_current(ticket) {
                    return;
                }
                let error = errors.from_store_error(SecurityRuleContext::new(Operation::Get, path), &e);
                report(&cell, ticket, error, &channel);
            })
        };

        let registration = self.store.listen(&target, on_next, on_error);
        self.cell.attach(ticket, registration);
        self.state()
    }

    /// Current state.
    pub fn state(&self) -> DocumentState<T> {
        self.cell.state()
    }

    /// Whether a live connection is open.
    pub fn is_connected(&self) -> bool {
        self.cell.has_connection()
    }

    /// Run `observer` after every state change.
    pub fn watch(&self, observer: impl Fn(&DocumentState<T>) + Send + Sync + 'static) -> ObserverId {
        let observer: Observer<WithId<T>> = Arc::new(observer);
        self.cell.watch(observer)
    }

    pub fn unwatch(&self, id: ObserverId) {
        self.cell.unwatch(id);
    }

    /// Close the connection and forget the target. Idempotent.
    ///
    /// A failed subscription is not retried; closing and subscribing again
    /// opens a fresh connection.
    pub fn close(&self) {
        self.cell.close();
    }
}

impl<T> Drop for DocumentCache<T> {
    fn drop(&mut self) {
        self.cell.close_on_drop();
    }
}
