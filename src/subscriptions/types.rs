//! Subscription state types.

use crate::permission::PermissionError;
use crate::types::WithId;
use std::sync::Arc;

/// Lifecycle of a cache's current connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// No target; nothing is open.
    Idle,
    /// Connection opened, first snapshot not yet received.
    Loading,
    /// Latest snapshot applied.
    Ready,
    /// Connection failed, or the last push could not be decoded.
    Errored,
}

/// What a consumer reads from a cache.
///
/// `data` is left at its last value when an error arrives.
#[derive(Clone, Debug)]
pub struct LiveState<V> {
    pub data: Option<V>,
    pub is_loading: bool,
    pub error: Option<Arc<PermissionError>>,
    pub status: SubscriptionStatus,
}

impl<V> LiveState<V> {
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            status: SubscriptionStatus::Idle,
        }
    }

    pub fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
            status: SubscriptionStatus::Loading,
        }
    }

    /// Errored before any connection was attempted.
    pub fn failed(error: Arc<PermissionError>) -> Self {
        Self {
            data: None,
            is_loading: false,
            error: Some(error),
            status: SubscriptionStatus::Errored,
        }
    }

    pub(crate) fn set_ready(&mut self, data: Option<V>) {
        self.data = data;
        self.is_loading = false;
        self.error = None;
        self.status = SubscriptionStatus::Ready;
    }

    pub(crate) fn set_error(&mut self, error: Arc<PermissionError>) {
        self.is_loading = false;
        self.error = Some(error);
        self.status = SubscriptionStatus::Errored;
    }

    pub fn is_ready(&self) -> bool {
        self.status == SubscriptionStatus::Ready
    }
}

impl<V> Default for LiveState<V> {
    fn default() -> Self {
        Self::idle()
    }
}

/// State of a document subscription. `data` is `None` for a missing document.
pub type DocumentState<T> = LiveState<WithId<T>>;

/// State of a collection subscription, rows in server order.
pub type CollectionState<T> = LiveState<Vec<WithId<T>>>;

/// Identifies a registered observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Called after every state change.
pub type Observer<V> = Arc<dyn Fn(&LiveState<V>) + Send + Sync>;
