//! Fire-and-forget write helpers.
//!
//! Each helper hands the write to the store and returns at once. The store's
//! answer never reaches the caller: a rejection is turned into a
//! [`PermissionError`](crate::permission::PermissionError) carrying the
//! payload that was sent, and published on the error channel. The only
//! synchronous failure is a payload that does not serialize to a field map.

use crate::channel::AppEvent;
use crate::client::Client;
use crate::error::{CacheError, Result, StoreError};
use crate::permission::SecurityRuleContext;
use crate::types::{CollectionRef, DocumentRef, Fields, SetOptions, WriteOp};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

impl Client {
    /// Create or overwrite `doc`. With `options.merge` the payload is merged
    /// into existing fields and checked as an `update`; otherwise it replaces
    /// the document and is checked as a `create`.
    pub fn set_document_non_blocking(
        &self,
        doc: &DocumentRef,
        payload: &impl Serialize,
        options: SetOptions,
    ) -> Result<()> {
        let data = to_fields(payload)?;
        self.submit(
            doc,
            WriteOp::Set {
                data,
                merge: options.merge,
            },
        );
        Ok(())
    }

    /// Create a document with a generated id under `collection`.
    ///
    /// The reference is returned before the store has seen the write.
    pub fn add_document_non_blocking(
        &self,
        collection: &CollectionRef,
        payload: &impl Serialize,
    ) -> Result<DocumentRef> {
        let data = to_fields(payload)?;
        let doc = collection.doc(&self.store.new_document_id())?;
        self.submit(&doc, WriteOp::Set { data, merge: false });
        Ok(doc)
    }

    /// Merge `payload` into an existing document.
    pub fn update_document_non_blocking(
        &self,
        doc: &DocumentRef,
        payload: &impl Serialize,
    ) -> Result<()> {
        let data = to_fields(payload)?;
        self.submit(doc, WriteOp::Update { data });
        Ok(())
    }

    pub fn delete_document_non_blocking(&self, doc: &DocumentRef) {
        self.submit(doc, WriteOp::Delete);
    }

    fn submit(&self, doc: &DocumentRef, op: WriteOp) {
        let path = doc.path().canonical_string();
        let context =
            SecurityRuleContext::new(op.operation(), path.as_str()).with_payload(op.payload());
        let errors = self.errors.clone();
        let channel = Arc::clone(&self.channel);

        tracing::debug!(path = %path, operation = %op.operation(), "submitting write");
        self.store.write(
            doc,
            op,
            Box::new(move |result: std::result::Result<(), StoreError>| {
                let Err(e) = result else {
                    return;
                };
                let error = errors.from_store_error(context, &e).into_shared();
                tracing::warn!(
                    path = %path,
                    operation = %error.operation(),
                    error = %e,
                    "write rejected"
                );
                channel.emit(AppEvent::PermissionError, &error);
            }),
        );
    }
}

/// Serialize a write payload. Anything but a JSON object is rejected.
fn to_fields(payload: &impl Serialize) -> Result<Fields> {
    let value = serde_json::to_value(payload).map_err(|e| {
        tracing::error!(error = %e, "write payload failed to serialize");
        CacheError::Encode(e.to_string())
    })?;
    match value {
        Value::Object(fields) => Ok(fields),
        other => {
            tracing::error!(kind = json_kind(&other), "write payload is not an object");
            Err(CacheError::Encode(format!(
                "expected an object payload, got {}",
                json_kind(&other)
            )))
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
