//! Entry point tying a store, a session and the error channel together.

use crate::channel::{AppEvent, ErrorChannel};
use crate::error::StoreError;
use crate::permission::{ErrorFactory, PermissionError, SecurityRuleContext};
use crate::session::SessionProvider;
use crate::store::ReactiveStore;
use crate::subscriptions::{CollectionCache, DocumentCache};
use crate::types::{DocumentRef, DocumentSnapshot, Operation, WithId};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Install the development listener that logs every broadcast error.
    pub dev_mode: bool,

    /// Database id used in diagnostic request paths.
    pub database_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            database_id: "(default)".to_string(),
        }
    }
}

impl ClientConfig {
    /// Read `LIVEQUERY_ENV` and `LIVEQUERY_DATABASE`, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(env) = std::env::var("LIVEQUERY_ENV") {
            config.dev_mode = env.eq_ignore_ascii_case("development");
        }
        if let Ok(database) = std::env::var("LIVEQUERY_DATABASE") {
            if !database.trim().is_empty() {
                config.database_id = database;
            }
        }
        config
    }
}

/// Hands out caches and write helpers bound to one store and session.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) store: Arc<dyn ReactiveStore>,
    pub(crate) session: Arc<dyn SessionProvider>,
    pub(crate) channel: Arc<ErrorChannel>,
    pub(crate) errors: ErrorFactory,
}

impl Client {
    /// Client publishing to the process-wide [`ErrorChannel::global`].
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn ReactiveStore>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self::with_channel(config, store, session, ErrorChannel::global())
    }

    /// Client publishing to an explicit channel.
    pub fn with_channel(
        config: ClientConfig,
        store: Arc<dyn ReactiveStore>,
        session: Arc<dyn SessionProvider>,
        channel: Arc<ErrorChannel>,
    ) -> Self {
        if config.dev_mode {
            channel.install_dev_logger();
        }
        let errors = ErrorFactory::new(Arc::clone(&session), config.database_id.clone());
        Self {
            config,
            store,
            session,
            channel,
            errors,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ReactiveStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<dyn SessionProvider> {
        &self.session
    }

    pub fn channel(&self) -> &Arc<ErrorChannel> {
        &self.channel
    }

    pub fn errors(&self) -> &ErrorFactory {
        &self.errors
    }

    /// A new, idle document cache.
    pub fn document<T>(&self) -> DocumentCache<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        DocumentCache::new(
            Arc::clone(&self.store),
            Arc::clone(&self.channel),
            self.errors.clone(),
        )
    }

    /// A new, idle collection cache.
    pub fn collection<T>(&self) -> CollectionCache<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        CollectionCache::new(
            Arc::clone(&self.store),
            Arc::clone(&self.channel),
            self.errors.clone(),
        )
    }

    /// Read one document once.
    ///
    /// Store failures become a `get` [`PermissionError`] that is broadcast
    /// and then passed to `on_complete`. A document that does not decode is
    /// reported to `on_complete` only.
    pub fn fetch_document<T, F>(&self, doc: &DocumentRef, on_complete: F)
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<Option<WithId<T>>, Arc<PermissionError>>) + Send + 'static,
    {
        let errors = self.errors.clone();
        let channel = Arc::clone(&self.channel);
        let path = doc.path().canonical_string();

        self.store.get_document(
            doc,
            Box::new(move |result: Result<DocumentSnapshot, StoreError>| {
                let context = SecurityRuleContext::new(Operation::Get, path.as_str());
                let outcome = match result {
                    Ok(snapshot) => snapshot
                        .data
                        .as_ref()
                        .map(|fields| WithId::<T>::decode(snapshot.id(), fields))
                        .transpose()
                        .map_err(|e| errors.decode(context, e.to_string()).into_shared()),
                    Err(e) => {
                        let error = errors.from_store_error(context, &e).into_shared();
                        tracing::warn!(path = %path, error = %e, "document read failed");
                        channel.emit(AppEvent::PermissionError, &error);
                        Err(error)
                    }
                };
                on_complete(outcome);
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Listener;
    use crate::runtime::EventLoop;
    use crate::session::StaticSession;
    use crate::store::{InMemoryStore, PathRules};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Clone, Debug, Deserialize)]
    struct Note {
        id: String,
        text: String,
    }

    fn setup(rules: PathRules) -> (EventLoop, InMemoryStore, Client) {
        let event_loop = EventLoop::new();
        let store = InMemoryStore::new(event_loop.handle());
        store.set_policy(rules);
        let client = Client::with_channel(
            ClientConfig::default(),
            Arc::new(store.clone()),
            Arc::new(StaticSession::anonymous()),
            Arc::new(ErrorChannel::new()),
        );
        (event_loop, store, client)
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(!config.dev_mode);
        assert_eq!(config.database_id, "(default)");
    }

    #[test]
    fn test_dev_mode_installs_logger_once() {
        let channel = Arc::new(ErrorChannel::new());
        let config = ClientConfig {
            dev_mode: true,
            ..Default::default()
        };
        let event_loop = EventLoop::new();
        let store: Arc<dyn ReactiveStore> = Arc::new(InMemoryStore::new(event_loop.handle()));
        let session: Arc<dyn SessionProvider> = Arc::new(StaticSession::anonymous());

        let _a = Client::with_channel(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&session),
            Arc::clone(&channel),
        );
        let _b = Client::with_channel(config, store, session, Arc::clone(&channel));
        assert_eq!(channel.listener_count(AppEvent::PermissionError), 1);
    }

    #[test]
    fn test_fetch_document_decodes() {
        let (event_loop, _store, client) = setup(PathRules::new());
        let doc = DocumentRef::new("notes/n1").unwrap();
        client
            .set_document_non_blocking(&doc, &json!({"text": "hi"}), Default::default())
            .unwrap();

        let result = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&result);
        client.fetch_document::<Note, _>(&doc, move |r| *sink.lock() = Some(r));
        event_loop.run_until_idle();

        let note = result.lock().take().unwrap().unwrap().unwrap();
        assert_eq!(note.id, "n1");
        assert_eq!(note.text, "hi");
    }

    #[test]
    fn test_fetch_document_denied_is_broadcast() {
        let (event_loop, _store, client) = setup(PathRules::new().deny("secret"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Listener = Arc::new(move |e| sink.lock().push(e.request().path.clone()));
        client.channel().on(AppEvent::PermissionError, listener);

        let result = Arc::new(Mutex::new(None));
        let out = Arc::clone(&result);
        client.fetch_document::<Note, _>(&DocumentRef::new("secret/x").unwrap(), move |r| {
            *out.lock() = Some(r.map(|_| ()))
        });
        event_loop.run_until_idle();

        let error = result.lock().take().unwrap().unwrap_err();
        assert_eq!(error.operation(), Operation::Get);
        assert_eq!(
            *seen.lock(),
            vec!["/databases/(default)/documents/secret/x".to_string()]
        );
    }
}
