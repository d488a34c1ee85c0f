//! Process-wide broadcast channel for permission errors.
//!
//! Any subscription or write that is rejected publishes here, independent of
//! which consumer opened it. Listeners are plain `Arc` closures; `off` removes
//! by pointer identity only.
//!
//! ```ignore
//! let channel = ErrorChannel::global();
//! let listener: Listener = Arc::new(|e| eprintln!("{}", e.path()));
//! channel.on(AppEvent::PermissionError, Arc::clone(&listener));
//! // ...
//! channel.off(AppEvent::PermissionError, &listener);
//! ```

use crate::permission::PermissionError;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

/// Callback invoked on emit.
pub type Listener = Arc<dyn Fn(&Arc<PermissionError>) + Send + Sync>;

/// Events carried by the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AppEvent {
    PermissionError,
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::PermissionError => "permission-error",
        }
    }
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static GLOBAL: OnceLock<Arc<ErrorChannel>> = OnceLock::new();

/// Fan-out bus. Emission is synchronous and in registration order.
#[derive(Default)]
pub struct ErrorChannel {
    listeners: RwLock<HashMap<AppEvent, Vec<Listener>>>,
    dev_logger: Mutex<Option<Listener>>,
}

impl ErrorChannel {
    /// A standalone channel, for injection and tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide channel. Created on first use and never torn down.
    pub fn global() -> Arc<ErrorChannel> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ErrorChannel::new())))
    }

    pub fn on(&self, event: AppEvent, listener: Listener) {
        self.listeners.write().entry(event).or_default().push(listener);
    }

    /// Remove every registration of `listener` (pointer identity).
    pub fn off(&self, event: AppEvent, listener: &Listener) {
        let mut listeners = self.listeners.write();
        if let Some(list) = listeners.get_mut(&event) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    /// Invoke every listener registered when the call started.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    /// Listeners may call `on`/`off` re-entrantly; changes apply to the next
    /// emit.
    pub fn emit(&self, event: AppEvent, payload: &Arc<PermissionError>) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .get(&event)
            .cloned()
            .unwrap_or_default();

        for listener in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(payload)));
            if outcome.is_err() {
                tracing::warn!(event = %event, path = payload.path(), "listener panicked during emit");
            }
        }
    }

    pub fn listener_count(&self, event: AppEvent) -> usize {
        self.listeners.read().get(&event).map_or(0, Vec::len)
    }

    /// Register the development logger. Idempotent; returns the listener so it
    /// can be removed with [`off`](Self::off) like any other.
    pub fn install_dev_logger(&self) -> Listener {
        let mut slot = self.dev_logger.lock();
        if let Some(existing) = slot.as_ref() {
            let registered = self
                .listeners
                .read()
                .get(&AppEvent::PermissionError)
                .is_some_and(|list| list.iter().any(|l| Arc::ptr_eq(l, existing)));
            if !registered {
                self.on(AppEvent::PermissionError, Arc::clone(existing));
            }
            return Arc::clone(existing);
        }
        let listener = dev_logger();
        self.on(AppEvent::PermissionError, Arc::clone(&listener));
        *slot = Some(Arc::clone(&listener));
        listener
    }

    /// Drop all listeners, including the dev logger. For test isolation.
    pub fn reset(&self) {
        self.listeners.write().clear();
        *self.dev_logger.lock() = None;
    }
}

/// Listener that logs path and message at `warn`.
pub fn dev_logger() -> Listener {
    Arc::new(|error: &Arc<PermissionError>| {
        tracing::warn!(
            path = error.path(),
            operation = %error.operation(),
            "permission error: {}",
            error.message()
        );
    })
}
