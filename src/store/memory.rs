//! In-memory reactive store.

use super::listeners::{ListenerManager, ListenerSink};
use super::query::{evaluate_query, matches_source};
use super::{
    auto_id, ErrorCallback, GetCallback, ListenRegistration, ReactiveStore, SnapshotCallback,
    WriteCallback, AUTO_ID_LENGTH,
};
use crate::error::StoreError;
use crate::runtime::LoopHandle;
use crate::types::{
    DocumentRef, DocumentSnapshot, Fields, Operation, ResourcePath, Snapshot, Target, WriteOp,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Length of ids handed out by `new_document_id`.
    pub auto_id_length: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auto_id_length: AUTO_ID_LENGTH,
        }
    }
}

/// A request as seen by the access-control hook.
#[derive(Clone, Debug)]
pub struct AccessRequest<'a> {
    pub operation: Operation,
    /// Store-relative path of the document or query base.
    pub path: &'a str,
    /// Incoming data for writes.
    pub payload: Option<&'a Fields>,
}

/// Access-control hook. Returning an error rejects the request with it.
pub trait AccessPolicy: Send + Sync {
    fn check(&self, request: &AccessRequest<'_>) -> Result<(), StoreError>;
}

impl<F> AccessPolicy for F
where
    F: Fn(&AccessRequest<'_>) -> Result<(), StoreError> + Send + Sync,
{
    fn check(&self, request: &AccessRequest<'_>) -> Result<(), StoreError> {
        self(request)
    }
}

/// Policy that permits everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check(&self, _request: &AccessRequest<'_>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Prefix-based rule list. The first matching rule rejects the request;
/// a request that matches no rule is allowed.
///
/// Prefixes match whole segments: `users` matches `users/a` but not `usersX`.
#[derive(Clone, Debug, Default)]
pub struct PathRules {
    rules: Vec<PathRule>,
}

#[derive(Clone, Debug)]
struct PathRule {
    prefix: ResourcePath,
    operations: Option<Vec<Operation>>,
    error: Option<StoreError>,
}

impl PathRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every operation under `prefix`.
    pub fn deny(self, prefix: &str) -> Self {
        self.push(prefix, None, None)
    }

    /// Deny only the listed operations under `prefix`.
    pub fn deny_operations(self, prefix: &str, operations: &[Operation]) -> Self {
        self.push(prefix, Some(operations.to_vec()), None)
    }

    /// Fail every request under `prefix` with `error`.
    pub fn fail(self, prefix: &str, error: StoreError) -> Self {
        self.push(prefix, None, Some(error))
    }

    fn push(
        mut self,
        prefix: &str,
        operations: Option<Vec<Operation>>,
        error: Option<StoreError>,
    ) -> Self {
        self.rules.push(PathRule {
            prefix: ResourcePath::parse(prefix),
            operations,
            error,
        });
        self
    }
}

impl AccessPolicy for PathRules {
    fn check(&self, request: &AccessRequest<'_>) -> Result<(), StoreError> {
        let path = ResourcePath::parse(request.path);
        let hit = self.rules.iter().find(|rule| {
            path.segments().starts_with(rule.prefix.segments())
                && rule
                    .operations
                    .as_ref()
                    .map_or(true, |ops| ops.contains(&request.operation))
        });
        match hit {
            None => Ok(()),
            Some(PathRule { error: Some(e), .. }) => Err(e.clone()),
            Some(_) => Err(StoreError::PermissionDenied {
                operation: request.operation.to_string(),
                path: request.path.to_string(),
            }),
        }
    }
}

struct StoreInner {
    config: StoreConfig,
    documents: RwLock<BTreeMap<ResourcePath, Fields>>,
    listeners: ListenerManager,
    policy: RwLock<Arc<dyn AccessPolicy>>,
    loop_handle: LoopHandle,
}

impl StoreInner {
    fn check(&self, request: &AccessRequest<'_>) -> Result<(), StoreError> {
        let policy = Arc::clone(&*self.policy.read());
        policy.check(request)
    }

    fn snapshot_for(&self, target: &Target) -> Snapshot {
        let documents = self.documents.read();
        match target {
            Target::Document(doc) => Snapshot::Document(DocumentSnapshot {
                reference: doc.clone(),
                data: documents.get(doc.path()).cloned(),
            }),
            Target::Query(query) => Snapshot::Query(evaluate_query(query, &documents)),
        }
    }

    fn deliver_initial(&self, sink: &ListenerSink) {
        if !sink.is_active() {
            return;
        }
        let operation = match sink.target {
            Target::Document(_) => Operation::Get,
            Target::Query(_) => Operation::List,
        };
        let path = sink.target.canonical_path();
        let request = AccessRequest {
            operation,
            path: &path,
            payload: None,
        };
        if let Err(e) = self.check(&request) {
            tracing::debug!(id = sink.id.0, path = %path, error = %e, "listen rejected");
            sink.fail(e);
            self.listeners.unregister(sink.id);
            return;
        }
        sink.deliver(self.snapshot_for(&sink.target));
    }

    fn apply(&self, doc: &DocumentRef, op: WriteOp) -> Result<(), StoreError> {
        let mut documents = self.documents.write();
        let key = doc.path().clone();
        match op {
            WriteOp::Set { data, merge: false } => {
                documents.insert(key, data);
            }
            WriteOp::Set { data, merge: true } => {
                merge_fields(documents.entry(key).or_default(), data);
            }
            WriteOp::Update { data } => match documents.get_mut(&key) {
                Some(existing) => merge_fields(existing, data),
                None => return Err(StoreError::NotFound(key.canonical_string())),
            },
            WriteOp::Delete => {
                documents.remove(&key);
            }
        }
        Ok(())
    }

    /// Queue a fresh snapshot for every connection that can see `path`.
    fn notify(&self, path: &ResourcePath) {
        let sinks = self.listeners.matching(|target| match target {
            Target::Document(doc) => doc.path() == path,
            Target::Query(query) => matches_source(query, path),
        });
        for sink in sinks {
            let snapshot = self.snapshot_for(&sink.target);
            self.loop_handle.spawn(move || sink.deliver(snapshot));
        }
    }
}

/// Deep-merge `incoming` into `existing`; nested objects merge, other values replace.
fn merge_fields(existing: &mut Fields, incoming: Fields) {
    for (key, value) in incoming {
        match value {
            Value::Object(next) if existing.get(&key).is_some_and(Value::is_object) => {
                if let Some(Value::Object(current)) = existing.get_mut(&key) {
                    merge_fields(current, next);
                }
            }
            value => {
                existing.insert(key, value);
            }
        }
    }
}

/// Reactive store held entirely in memory.
///
/// All callbacks are posted to the event loop behind `loop_handle`; nothing
/// is invoked from inside `listen`, `write` or `get_document`.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

impl InMemoryStore {
    pub fn new(loop_handle: LoopHandle) -> Self {
        Self::with_config(loop_handle, StoreConfig::default())
    }

    pub fn with_config(loop_handle: LoopHandle, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                documents: RwLock::new(BTreeMap::new()),
                listeners: ListenerManager::new(),
                policy: RwLock::new(Arc::new(AllowAll)),
                loop_handle,
            }),
        }
    }

    /// Replace the access-control hook. Applies to requests checked from now on.
    pub fn set_policy(&self, policy: impl AccessPolicy + 'static) {
        *self.inner.policy.write() = Arc::new(policy);
    }

    /// Number of open live connections.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.listener_count()
    }

    /// Read a document directly, bypassing access control.
    pub fn document(&self, doc: &DocumentRef) -> Option<Fields> {
        self.inner.documents.read().get(doc.path()).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.inner.documents.read().len()
    }
}

impl ReactiveStore for InMemoryStore {
    fn get_document(&self, doc: &DocumentRef, on_complete: GetCallback) {
        let inner = Arc::clone(&self.inner);
        let doc = doc.clone();
        self.inner.loop_handle.spawn(move || {
            let path = doc.path().canonical_string();
            let request = AccessRequest {
                operation: Operation::Get,
                path: &path,
                payload: None,
            };
            let result = inner.check(&request).map(|()| DocumentSnapshot {
                data: inner.documents.read().get(doc.path()).cloned(),
                reference: doc,
            });
            on_complete(result);
        });
    }

    fn listen(
        &self,
        target: &Target,
        on_next: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> ListenRegistration {
        let sink = self.inner.listeners.register(target.clone(), on_next, on_error);
        let id = sink.id;
        tracing::debug!(id = id.0, target = %target.signature(), "listener opened");

        let inner = Arc::clone(&self.inner);
        self.inner
            .loop_handle
            .spawn(move || inner.deliver_initial(&sink));

        let weak = Arc::downgrade(&self.inner);
        ListenRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.unregister(id);
            }
        })
    }

    fn write(&self, doc: &DocumentRef, op: WriteOp, on_complete: WriteCallback) {
        let inner = Arc::clone(&self.inner);
        let doc = doc.clone();
        self.inner.loop_handle.spawn(move || {
            let path = doc.path().canonical_string();
            let payload = match &op {
                WriteOp::Set { data, .. } | WriteOp::Update { data } => Some(data),
                WriteOp::Delete => None,
            };
            let request = AccessRequest {
                operation: op.operation(),
                path: &path,
                payload,
            };
            let result = inner
                .check(&request)
                .and_then(|()| inner.apply(&doc, op));
            if result.is_ok() {
                inner.notify(doc.path());
            }
            on_complete(result);
        });
    }

    fn new_document_id(&self) -> String {
        auto_id(self.inner.config.auto_id_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EventLoop;
    use crate::types::{CollectionRef, Query};
    use parking_lot::Mutex;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    fn set(store: &InMemoryStore, path: &str, value: Value, merge: bool) {
        store.write(
            &DocumentRef::new(path).unwrap(),
            WriteOp::Set {
                data: fields(value),
                merge,
            },
            Box::new(|r| assert!(r.is_ok())),
        );
    }

    #[test]
    fn test_write_is_deferred() {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        let doc = DocumentRef::new("users/a").unwrap();

        set(&store, "users/a", json!({"name": "Ada"}), false);
        assert!(store.document(&doc).is_none());

        event_loop.run_until_idle();
        assert_eq!(store.document(&doc).unwrap()["name"], "Ada");
    }

    #[test]
    fn test_merge_and_replace() {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        let doc = DocumentRef::new("users/a").unwrap();

        set(&store, "users/a", json!({"name": "Ada", "stats": {"streak": 1}}), false);
        set(&store, "users/a", json!({"stats": {"points": 5}}), true);
        event_loop.run_until_idle();

        let merged = store.document(&doc).unwrap();
        assert_eq!(merged["name"], "Ada");
        assert_eq!(merged["stats"]["streak"], 1);
        assert_eq!(merged["stats"]["points"], 5);

        set(&store, "users/a", json!({"name": "Grace"}), false);
        event_loop.run_until_idle();
        let replaced = store.document(&doc).unwrap();
        assert!(replaced.get("stats").is_none());
    }

    #[test]
    fn test_update_missing_document_fails() {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        let outcome = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&outcome);

        store.write(
            &DocumentRef::new("users/ghost").unwrap(),
            WriteOp::Update {
                data: fields(json!({"x": 1})),
            },
            Box::new(move |r| *slot.lock() = Some(r)),
        );
        event_loop.run_until_idle();

        assert!(matches!(
            outcome.lock().take(),
            Some(Err(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_listen_pushes_initial_and_changes() {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        let pushes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pushes);

        let target = Target::Query(Query::collection(CollectionRef::new("subjects").unwrap()));
        let _reg = store.listen(
            &target,
            Box::new(move |snapshot| {
                if let Snapshot::Query(q) = snapshot {
                    sink.lock().push(q.len());
                }
            }),
            Box::new(|_| panic!("unexpected error")),
        );
        assert!(pushes.lock().is_empty());

        event_loop.run_until_idle();
        set(&store, "subjects/math", json!({"name": "Mathematics"}), false);
        event_loop.run_until_idle();

        assert_eq!(*pushes.lock(), vec![0, 1]);
    }

    #[test]
    fn test_policy_rejects_listen() {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        store.set_policy(PathRules::new().deny("secret"));

        let failed = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&failed);
        let _reg = store.listen(
            &Target::Document(DocumentRef::new("secret/a").unwrap()),
            Box::new(|_| panic!("should not deliver")),
            Box::new(move |e| *slot.lock() = Some(e)),
        );
        event_loop.run_until_idle();

        assert!(failed.lock().as_ref().unwrap().is_permission_denied());
        assert_eq!(store.listener_count(), 0);
    }

    fn read_only(req: &AccessRequest<'_>) -> Result<(), StoreError> {
        match req.operation {
            Operation::Get | Operation::List => Ok(()),
            op => Err(StoreError::PermissionDenied {
                operation: op.to_string(),
                path: req.path.to_string(),
            }),
        }
    }

    #[test]
    fn test_fn_policy_rejects_write() {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        store.set_policy(read_only);

        let outcome = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&outcome);
        store.write(
            &DocumentRef::new("users/a").unwrap(),
            WriteOp::Delete,
            Box::new(move |r| *slot.lock() = Some(r)),
        );
        event_loop.run_until_idle();

        assert!(matches!(
            outcome.lock().take(),
            Some(Err(StoreError::PermissionDenied { .. }))
        ));
    }

    #[test]
    fn test_path_rules_segment_prefix() {
        let rules = PathRules::new()
            .deny_operations("users", &[Operation::Delete])
            .fail("flaky", StoreError::Unavailable("offline".into()));
        let req = |operation, path| AccessRequest {
            operation,
            path,
            payload: None,
        };

        assert!(rules.check(&req(Operation::Get, "users/a")).is_ok());
        assert!(rules.check(&req(Operation::Delete, "users/a")).is_err());
        assert!(rules.check(&req(Operation::Delete, "usersX/a")).is_ok());
        assert_eq!(
            rules.check(&req(Operation::List, "flaky")),
            Err(StoreError::Unavailable("offline".into()))
        );
    }

    #[test]
    fn test_removed_registration_discards_queued_delivery() {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        let reg = store.listen(
            &Target::Document(DocumentRef::new("users/a").unwrap()),
            Box::new(|_| panic!("closed listener received a snapshot")),
            Box::new(|_| {}),
        );
        reg.remove();
        event_loop.run_until_idle();
        assert_eq!(store.listener_count(), 0);
    }
}
