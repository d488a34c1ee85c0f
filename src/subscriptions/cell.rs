//! Generation-guarded state cell shared by the document and collection caches.
//!
//! Every retarget bumps the generation. Store callbacks carry the generation
//! they were opened under and are ignored once it is no longer current, so a
//! late snapshot from an abandoned connection can never reach the consumer.

use super::types::{LiveState, Observer, ObserverId};
use crate::channel::{AppEvent, ErrorChannel};
use crate::permission::PermissionError;
use crate::store::ListenRegistration;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Proof of which connection a callback belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

pub(crate) enum Transition {
    /// Same target as before; the open connection is kept.
    Unchanged,
    /// Target cleared; nothing is open.
    Cleared,
    /// New target accepted under this ticket.
    Opened(Ticket),
}

struct CellInner<V> {
    generation: u64,
    signature: Option<String>,
    state: LiveState<V>,
    registration: Option<ListenRegistration>,
    observers: Vec<(ObserverId, Observer<V>)>,
    next_observer: u64,
}

pub(crate) struct LiveCell<V> {
    inner: Arc<Mutex<CellInner<V>>>,
}

pub(crate) struct WeakCell<V> {
    inner: Weak<Mutex<CellInner<V>>>,
}

impl<V> WeakCell<V> {
    pub fn upgrade(&self) -> Option<LiveCell<V>> {
        self.inner.upgrade().map(|inner| LiveCell { inner })
    }
}

impl<V> LiveCell<V> {
    /// Teardown for an owner that is going away: close the connection and
    /// drop observers without notifying them.
    pub fn close_on_drop(&self) {
        let registration = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.signature = None;
            inner.observers.clear();
            inner.registration.take()
        };
        if let Some(registration) = registration {
            registration.remove();
        }
    }
}

impl<V: Clone> LiveCell<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CellInner {
                generation: 0,
                signature: None,
                state: LiveState::idle(),
                registration: None,
                observers: Vec::new(),
                next_observer: 1,
            })),
        }
    }

    pub fn downgrade(&self) -> WeakCell<V> {
        WeakCell {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> LiveState<V> {
        self.inner.lock().state.clone()
    }

    pub fn has_connection(&self) -> bool {
        self.inner
            .lock()
            .registration
            .as_ref()
            .is_some_and(ListenRegistration::is_active)
    }

    /// Switch to a new target signature (`None` clears).
    ///
    /// The old connection is closed before this returns, and before the
    /// caller opens a new one.
    pub fn retarget(&self, signature: Option<String>, initial: LiveState<V>) -> Transition {
        let (old, transition) = {
            let mut inner = self.inner.lock();
            if inner.signature == signature {
                return Transition::Unchanged;
            }
            inner.generation += 1;
            inner.signature = signature;
            inner.state = initial;
            let transition = match inner.signature {
                Some(_) => Transition::Opened(Ticket(inner.generation)),
                None => Transition::Cleared,
            };
            (inner.registration.take(), transition)
        };

        if let Some(old) = old {
            tracing::debug!("closing previous connection");
            old.remove();
        }
        self.notify();
        transition
    }

    /// Keep the registration for `ticket`, or close it at once if the cell has
    /// moved on.
    pub fn attach(&self, ticket: Ticket, registration: ListenRegistration) {
        let stale = {
            let mut inner = self.inner.lock();
            if inner.generation == ticket.0 {
                inner.registration = Some(registration);
                None
            } else {
                Some(registration)
            }
        };
        if let Some(registration) = stale {
            tracing::debug!(generation = ticket.0, "connection superseded before attach");
            registration.remove();
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.inner.lock().generation == ticket.0
    }

    /// Mutate state for `ticket` and notify observers. Stale tickets are ignored.
    pub fn apply(&self, ticket: Ticket, update: impl FnOnce(&mut LiveState<V>)) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != ticket.0 {
                tracing::debug!(generation = ticket.0, "dropping stale delivery");
                return false;
            }
            update(&mut inner.state);
        }
        self.notify();
        true
    }

    /// Record a terminal error for `ticket` and close its connection.
    pub fn terminate(&self, ticket: Ticket, error: Arc<PermissionError>) -> bool {
        let registration = {
            let mut inner = self.inner.lock();
            if inner.generation != ticket.0 {
                return false;
            }
            inner.state.set_error(error);
            inner.registration.take()
        };
        if let Some(registration) = registration {
            registration.remove();
        }
        self.notify();
        true
    }

    /// Drop the target and its connection. Idempotent.
    pub fn close(&self) {
        if let Transition::Cleared = self.retarget(None, LiveState::idle()) {
            tracing::debug!("subscription closed");
        }
    }

    pub fn watch(&self, observer: Observer<V>) -> ObserverId {
        let mut inner = self.inner.lock();
        let id = ObserverId(inner.next_observer);
        inner.next_observer += 1;
        inner.observers.push((id, observer));
        id
    }

    pub fn unwatch(&self, id: ObserverId) {
        self.inner.lock().observers.retain(|(oid, _)| *oid != id);
    }

    fn notify(&self) {
        let (state, observers) = {
            let inner = self.inner.lock();
            if inner.observers.is_empty() {
                return;
            }
            let observers: Vec<Observer<V>> =
                inner.observers.iter().map(|(_, o)| Arc::clone(o)).collect();
            (inner.state.clone(), observers)
        };
        for observer in observers {
            observer(&state);
        }
    }
}

/// Terminate `ticket` with `error`; broadcast it if the cell accepted it and
/// the error kind is one that goes out globally.
pub(crate) fn report<V: Clone>(
    cell: &LiveCell<V>,
    ticket: Ticket,
    error: PermissionError,
    channel: &ErrorChannel,
) {
    let error = error.into_shared();
    if !cell.terminate(ticket, Arc::clone(&error)) {
        return;
    }
    tracing::warn!(
        path = error.path(),
        operation = %error.operation(),
        kind = ?error.kind(),
        "subscription failed"
    );
    if error.kind().is_broadcast() {
        channel.emit(AppEvent::PermissionError, &error);
    }
}
