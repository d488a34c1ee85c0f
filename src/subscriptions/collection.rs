//! Live view of a collection or query.

use super::cell::{report, LiveCell, Transition};
use super::types::{CollectionState, LiveState, Observer, ObserverId};
use crate::channel::ErrorChannel;
use crate::error::StoreError;
use crate::permission::{ErrorFactory, SecurityRuleContext};
use crate::store::ReactiveStore;
use crate::types::{Operation, Query, QuerySnapshot, Snapshot, Target, WithId};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Path reported when the store cannot tell us the query's base path.
const UNKNOWN_PATH: &str = "unknown";

/// Keeps one live connection to a query and exposes the latest result set.
///
/// Every push replaces the whole list. A query whose base path is empty or
/// the root is rejected locally without contacting the store.
pub struct CollectionCache<T> {
    store: Arc<dyn ReactiveStore>,
    channel: Arc<ErrorChannel>,
    errors: ErrorFactory,
    cell: LiveCell<Vec<WithId<T>>>,
    _record: PhantomData<fn() -> T>,
}

fn decode_rows<T: DeserializeOwned>(snapshot: &QuerySnapshot) -> crate::error::Result<Vec<WithId<T>>> {
    snapshot
        .docs
        .iter()
        .map(|doc| WithId::decode(doc.id(), &doc.data))
        .collect()
}

impl<T> CollectionCache<T>
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
    /// `None` means "no subscription". An invalid target comes back already
    /// errored.
    pub fn subscribe(&self, target: Option<&Query>) -> CollectionState<T> {
        let Some(query) = target else {
            self.cell.retarget(None, LiveState::idle());
            return self.state();
        };

        let target = Target::Query(query.clone());
        let signature = target.signature();
        let local_path = target.canonical_path();
        if local_path.trim_matches('/').is_empty() {
            let error = self
                .errors
                .invalid_reference(SecurityRuleContext::new(Operation::List, local_path))
                .into_shared();
            tracing::debug!(signature = %signature, "rejecting root-level query");
            self.cell.retarget(Some(signature), LiveState::failed(error));
            return self.state();
        }
        let path = match self.store.canonical_path(&target) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(error = %e, "canonical path unavailable");
                UNKNOWN_PATH.to_string()
            }
        };

        let ticket = match self.cell.retarget(Some(signature), LiveState::loading()) {
            Transition::Opened(ticket) => ticket,
            Transition::Unchanged | Transition::Cleared => return self.state(),
        };
        tracing::debug!(path = %path, "opening collection subscription");

        let on_next = {
            let cell = self.cell.downgrade();
            let errors = self.errors.clone();
            let path = path.clone();
            Box::new(move |snapshot: Snapshot| {
                let Some(cell) = cell.upgrade() else {
                    return;
                };
                let Snapshot::Query(snapshot) = snapshot else {
                    tracing::warn!(path = %path, "collection subscription received a document snapshot");
                    return;
                };
                match decode_rows::<T>(&snapshot) {
                    Ok(rows) => {
                        cell.apply(ticket, |state| state.set_ready(Some(rows)));
                    }
                    Err(e) => {
                        if !cell.is_current(ticket) {
                            return;
                        }
                        let error = errors
                            .decode(SecurityRuleContext::new(Operation::List, path.as_str()), e.to_string())
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
                let error =
                    errors.from_store_error(SecurityRuleContext::new(Operation::List, path), &e);
                report(&cell, ticket, error, &channel);
            })
        };

        let registration = self.store.listen(&target, on_next, on_error);
        self.cell.attach(ticket, registration);
        self.state()
    }

    pub fn state(&self) -> CollectionState<T> {
        self.cell.state()
    }

    pub fn is_connected(&self) -> bool {
        self.cell.has_connection()
    }

    pub fn watch(
        &self,
        observer: impl Fn(&CollectionState<T>) + Send + Sync + 'static,
    ) -> ObserverId {
        let observer: Observer<Vec<WithId<T>>> = Arc::new(observer);
        self.cell.watch(observer)
    }

    pub fn unwatch(&self, id: ObserverId) {
        self.cell.unwatch(id);
    }

    /// Close the connection and forget the target. Idempotent.
    pub fn close(&self) {
        self.cell.close();
    }
}

impl<T> Drop for CollectionCache<T> {
    fn drop(&mut self) {
        self.cell.close_on_drop();
    }
}
