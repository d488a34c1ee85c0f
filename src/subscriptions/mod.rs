//! Live-query subscription caches.
//!
//! A cache turns a document reference or query into a continuously updated
//! local view:
//! - One live connection per cache at a time
//! - Loading / ready / errored state, readable at any time
//! - Access-denied and transport failures land on the state *and* on the
//!   [`ErrorChannel`](crate::channel::ErrorChannel)
//! - Snapshots from a connection that was replaced are never applied
//!
//! Failed connections are not retried.
//!
//! # Example
//!
//! ```ignore
//! let attempts: CollectionCache<QuizAttempt> = client.collection();
//! let query = Query::collection(CollectionRef::new("users/u1/quizAttempts")?)
//!     .order_by("timestamp", Direction::Descending);
//!
//! attempts.watch(|state| {
//!     if let Some(rows) = &state.data {
//!         println!("{} attempts", rows.len());
//!     }
//! });
//! attempts.subscribe(Some(&query));
//! ```

mod cell;
mod collection;
mod document;
mod types;

pub use collection::CollectionCache;
pub use document::DocumentCache;
pub use types::{
    CollectionState, DocumentState, LiveState, Observer, ObserverId, SubscriptionStatus,
};
