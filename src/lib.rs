//! # Live Query
//!
//! Live document and query subscriptions over a push-based document store,
//! with access-denied failures turned into rich, inspectable errors.
//!
//! ## Core Concepts
//!
//! - **Caches**: [`DocumentCache`] and [`CollectionCache`] hold one live
//!   connection each and expose loading / ready / errored state
//! - **Errors**: every rejected read or write becomes a [`PermissionError`]
//!   that reproduces the request as a rules simulator would see it
//! - **Channel**: rejections are also broadcast on an [`ErrorChannel`] so a
//!   single place in the app can react to them
//! - **Stores**: anything implementing [`ReactiveStore`]; [`InMemoryStore`]
//!   is a complete in-process implementation
//!
//! ## Example
//!
//! ```ignore
//! use livequery::{Client, ClientConfig, EventLoop, InMemoryStore, StaticSession};
//!
//! let event_loop = EventLoop::new();
//! let store = InMemoryStore::new(event_loop.handle());
//! let client = Client::new(
//!     ClientConfig::from_env(),
//!     Arc::new(store),
//!     Arc::new(StaticSession::anonymous()),
//! );
//!
//! let profile: DocumentCache<UserProfile> = client.document();
//! profile.subscribe(Some(&DocumentRef::new("users/u1/profile/u1")?));
//! event_loop.run_until_idle();
//!
//! if let Some(error) = &profile.state().error {
//!     eprintln!("{}", error);
//! }
//! ```

pub mod channel;
pub mod client;
pub mod error;
pub mod memo;
pub mod models;
pub mod permission;
pub mod runtime;
pub mod session;
pub mod store;
pub mod subscriptions;
pub mod types;
mod writes;

// Re-exports
pub use channel::{dev_logger, AppEvent, ErrorChannel, Listener};
pub use client::{Client, ClientConfig};
pub use error::{CacheError, Result, StoreError};
pub use memo::Memo;
pub use models::{LeaderboardEntry, Qualification, QuizAttempt, UserProfile, UserProgress};
pub use permission::{
    ErrorFactory, ErrorKind, PermissionError, SecurityRuleContext, SecurityRuleRequest,
};
pub use runtime::{EventLoop, LoopHandle};
pub use session::{Principal, ProviderInfo, SessionError, SessionProvider, StaticSession};
pub use store::{
    AccessPolicy, AccessRequest, AllowAll, InMemoryStore, ListenRegistration, PathRules,
    ReactiveStore, StoreConfig,
};
pub use subscriptions::{
    CollectionCache, CollectionState, DocumentCache, DocumentState, LiveState, ObserverId,
    SubscriptionStatus,
};
pub use types::{
    CollectionRef, Direction, DocumentRef, DocumentSnapshot, Fields, Filter, FilterOp,
    Operation, OrderBy, Query, QueryDocument, QuerySnapshot, ResourcePath, SetOptions, Snapshot,
    Target, Timestamp, WithId, WriteOp,
};
