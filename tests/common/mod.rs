//! Shared helpers for integration tests.

#![allow(dead_code)]

use livequery::store::{ErrorCallback, GetCallback, SnapshotCallback, WriteCallback};
use livequery::{
    AppEvent, Client, ClientConfig, DocumentRef, DocumentSnapshot, ErrorChannel, Fields,
    ListenRegistration, Listener, PermissionError, Principal, QueryDocument, QuerySnapshot,
    ReactiveStore, Snapshot, StaticSession, StoreError, Target, WriteOp,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

pub fn doc_snapshot(path: &str, value: Option<Value>) -> Snapshot {
    Snapshot::Document(DocumentSnapshot {
        reference: DocumentRef::new(path).unwrap(),
        data: value.map(fields),
    })
}

pub fn query_snapshot(rows: &[(&str, Value)]) -> Snapshot {
    Snapshot::Query(QuerySnapshot {
        docs: rows
            .iter()
            .map(|(path, value)| QueryDocument {
                reference: DocumentRef::new(path).unwrap(),
                data: fields(value.clone()),
            })
            .collect(),
    })
}

/// One `listen` call seen by [`ScriptedStore`].
pub struct ScriptedListen {
    pub target: Target,
    active: Arc<AtomicBool>,
    on_next: Arc<Mutex<SnapshotCallback>>,
    on_error: Arc<Mutex<Option<ErrorCallback>>>,
}

impl ScriptedListen {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Store that does nothing on its own: tests drive every delivery by hand.
///
/// Deliveries are made even to connections that were already removed, which
/// is how a late snapshot from an old connection looks from the cache side.
#[derive(Default)]
pub struct ScriptedStore {
    listens: Mutex<Vec<Arc<ScriptedListen>>>,
    writes: Mutex<Vec<(DocumentRef, WriteOp, Option<WriteCallback>)>>,
    reads: Mutex<Vec<(DocumentRef, Option<GetCallback>)>>,
    canonical_path_error: Mutex<Option<StoreError>>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn listen_count(&self) -> usize {
        self.listens.lock().len()
    }

    pub fn active_count(&self) -> usize {
        self.listens.lock().iter().filter(|l| l.is_active()).count()
    }

    pub fn listen_at(&self, index: usize) -> Arc<ScriptedListen> {
        Arc::clone(&self.listens.lock()[index])
    }

    pub fn push(&self, index: usize, snapshot: Snapshot) {
        let listen = self.listen_at(index);
        let mut on_next = listen.on_next.lock();
        (&mut **on_next)(snapshot);
    }

    pub fn fail(&self, index: usize, error: StoreError) {
        let listen = self.listen_at(index);
        let on_error = listen.on_error.lock().take();
        if let Some(on_error) = on_error {
            on_error(error);
        }
    }

    pub fn fail_canonical_path(&self, error: StoreError) {
        *self.canonical_path_error.lock() = Some(error);
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn write_op(&self, index: usize) -> WriteOp {
        self.writes.lock()[index].1.clone()
    }

    pub fn complete_write(&self, index: usize, result: Result<(), StoreError>) {
        let callback = self.writes.lock()[index].2.take();
        if let Some(callback) = callback {
            callback(result);
        }
    }

    pub fn complete_read(&self, index: usize, result: Result<DocumentSnapshot, StoreError>) {
        let callback = self.reads.lock()[index].1.take();
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

impl ReactiveStore for ScriptedStore {
    fn get_document(&self, doc: &DocumentRef, on_complete: GetCallback) {
        self.reads.lock().push((doc.clone(), Some(on_complete)));
    }

    fn listen(
        &self,
        target: &Target,
        on_next: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> ListenRegistration {
        let active = Arc::new(AtomicBool::new(true));
        self.listens.lock().push(Arc::new(ScriptedListen {
            target: target.clone(),
            active: Arc::clone(&active),
            on_next: Arc::new(Mutex::new(on_next)),
            on_error: Arc::new(Mutex::new(Some(on_error))),
        }));
        ListenRegistration::new(move || active.store(false, Ordering::SeqCst))
    }

    fn write(&self, doc: &DocumentRef, op: WriteOp, on_complete: WriteCallback) {
        self.writes.lock().push((doc.clone(), op, Some(on_complete)));
    }

    fn canonical_path(&self, target: &Target) -> Result<String, StoreError> {
        match self.canonical_path_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(target.canonical_path()),
        }
    }
}

/// Collects everything broadcast on a channel.
pub struct Captured {
    pub errors: Arc<Mutex<Vec<Arc<PermissionError>>>>,
    pub listener: Listener,
}

impl Captured {
    pub fn on(channel: &ErrorChannel) -> Self {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let listener: Listener = Arc::new(move |e| sink.lock().push(Arc::clone(e)));
        channel.on(AppEvent::PermissionError, Arc::clone(&listener));
        Self { errors, listener }
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn get(&self, index: usize) -> Arc<PermissionError> {
        Arc::clone(&self.errors.lock()[index])
    }
}

/// Client over a scripted store with its own channel.
pub fn scripted_client(principal: Option<Principal>) -> (Arc<ScriptedStore>, Client, Captured) {
    let store = ScriptedStore::new();
    let channel = Arc::new(ErrorChannel::new());
    let captured = Captured::on(&channel);
    let session = match principal {
        Some(p) => StaticSession::signed_in(p),
        None => StaticSession::anonymous(),
    };
    let client = Client::with_channel(
        ClientConfig::default(),
        Arc::clone(&store) as Arc<dyn ReactiveStore>,
        Arc::new(session),
        channel,
    );
    (store, client, captured)
}
