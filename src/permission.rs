//! Structured permission errors.
//!
//! A [`PermissionError`] renders the denied request the same way the store's
//! rule simulator expects it: method, full resource path, the payload of a
//! rejected write, and the auth claims of whoever was signed in. Pasting the
//! message body into the simulator reproduces the denial.

use crate::error::StoreError;
use crate::session::{Principal, SessionProvider};
use crate::types::Operation;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const DENIED_PREFIX: &str =
    "Missing or insufficient permissions: The following request was denied by security rules:\n";

/// What the caller was trying to do when it was rejected.
#[derive(Clone, Debug, PartialEq)]
pub struct SecurityRuleContext {
    pub path: String,
    pub operation: Operation,
    pub request_resource_data: Option<Value>,
}

impl SecurityRuleContext {
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operation,
            request_resource_data: None,
        }
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.request_resource_data = payload;
        self
    }
}

/// Claims under `request.auth.token.firebase`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderClaims {
    pub identities: BTreeMap<String, Vec<String>>,
    pub sign_in_provider: String,
    pub tenant: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuthToken {
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub sub: String,
    #[serde(rename = "firebase")]
    pub provider_claims: ProviderClaims,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuthObject {
    pub uid: String,
    pub token: AuthToken,
}

impl AuthObject {
    fn from_principal(principal: &Principal) -> Self {
        let identities = principal
            .provider_data
            .iter()
            .filter(|p| !p.provider_id.is_empty() && !p.uid.is_empty())
            .map(|p| (p.provider_id.clone(), vec![p.uid.clone()]))
            .collect();

        Self {
            uid: principal.uid.clone(),
            token: AuthToken {
                name: principal.display_name.clone(),
                email: principal.email.clone(),
                email_verified: principal.email_verified,
                phone_number: principal.phone_number.clone(),
                sub: principal.uid.clone(),
                provider_claims: ProviderClaims {
                    identities,
                    sign_in_provider: principal.sign_in_provider().to_string(),
                    tenant: principal.tenant_id.clone(),
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceData {
    pub data: Value,
}

/// The request as the rule simulator sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SecurityRuleRequest {
    pub auth: Option<AuthObject>,
    pub method: Operation,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceData>,
}

/// Why an operation was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Access control said no.
    PermissionDenied,
    /// Malformed or root-level target, caught before reaching the store.
    InvalidReference,
    /// Any other store failure. Terminal, not retried.
    Transport,
    /// A pushed document did not match the expected record type.
    Decode,
}

impl ErrorKind {
    /// Whether errors of this kind go out on the broadcast channel.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, ErrorKind::PermissionDenied | ErrorKind::Transport)
    }
}

/// A rejected read or write, with enough context to reproduce it.
///
/// Immutable once built; shared as `Arc<PermissionError>` between the
/// subscription that hit it and every broadcast listener.
#[derive(Clone, Debug, PartialEq)]
pub struct PermissionError {
    kind: ErrorKind,
    operation: Operation,
    path: String,
    request_payload: Option<Value>,
    request: SecurityRuleRequest,
    message: String,
}

impl PermissionError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Store-relative path of the target.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn request_payload(&self) -> Option<&Value> {
        self.request_payload.as_ref()
    }

    pub fn request(&self) -> &SecurityRuleRequest {
        &self.request
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Display for PermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PermissionError {}

/// Builds [`PermissionError`]s, snapshotting the signed-in principal at
/// construction time.
#[derive(Clone)]
pub struct ErrorFactory {
    session: Arc<dyn SessionProvider>,
    database_id: String,
}

impl ErrorFactory {
    pub fn new(session: Arc<dyn SessionProvider>, database_id: impl Into<String>) -> Self {
        Self {
            session,
            database_id: database_id.into(),
        }
    }

    /// Access-control denial.
    pub fn denied(&self, context: SecurityRuleContext) -> PermissionError {
        self.build(ErrorKind::PermissionDenied, context, None)
    }

    /// Classify a store failure: denials keep the simulator message, anything
    /// else gets the same shape with a generic message.
    pub fn from_store_error(
        &self,
        context: SecurityRuleContext,
        error: &StoreError,
    ) -> PermissionError {
        if error.is_permission_denied() {
            self.denied(context)
        } else {
            self.build(ErrorKind::Transport, context, Some(error.to_string()))
        }
    }

    pub fn invalid_reference(&self, context: SecurityRuleContext) -> PermissionError {
        self.build(ErrorKind::InvalidReference, context, None)
    }

    pub fn decode(&self, context: SecurityRuleContext, detail: impl Into<String>) -> PermissionError {
        self.build(ErrorKind::Decode, context, Some(detail.into()))
    }

    fn build(
        &self,
        kind: ErrorKind,
        context: SecurityRuleContext,
        cause: Option<String>,
    ) -> PermissionError {
        let request = SecurityRuleRequest {
            auth: self.lookup_auth(),
            method: context.operation,
            path: format!(
                "/databases/{}/documents/{}",
                self.database_id,
                context.path.trim_start_matches('/')
            ),
            resource: context
                .request_resource_data
                .clone()
                .map(|data| ResourceData { data }),
        };

        let message = match kind {
            ErrorKind::PermissionDenied => {
                let rendered = serde_json::to_string_pretty(&request)
                    .unwrap_or_else(|e| format!("<unrenderable request: {}>", e));
                format!("{}{}", DENIED_PREFIX, rendered)
            }
            ErrorKind::InvalidReference => format!(
                "Invalid reference: '{}' does not name a readable collection",
                context.path
            ),
            ErrorKind::Transport => format!(
                "Request failed ({} on {}): {}",
                context.operation,
                context.path,
                cause.as_deref().unwrap_or("unknown error")
            ),
            ErrorKind::Decode => format!(
                "Failed to decode {}: {}",
                context.path,
                cause.as_deref().unwrap_or("unknown error")
            ),
        };

        PermissionError {
            kind,
            operation: context.operation,
            path: context.path,
            request_payload: context.request_resource_data,
            request,
            message,
        }
    }

    /// Identity failures degrade to anonymous.
    fn lookup_auth(&self) -> Option<AuthObject> {
        match self.session.current_principal() {
            Ok(principal) => principal.as_ref().map(AuthObject::from_principal),
            Err(e) => {
                tracing::debug!(error = %e, "identity lookup failed, treating as anonymous");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionError, StaticSession};
    use serde_json::json;

    struct BrokenSession;

    impl SessionProvider for BrokenSession {
        fn current_principal(&self) -> Result<Option<Principal>, SessionError> {
            Err(SessionError::NotInitialized)
        }
    }

    fn factory(session: impl SessionProvider + 'static) -> ErrorFactory {
        ErrorFactory::new(Arc::new(session), "(default)")
    }

    #[test]
    fn test_denied_message_contains_request() {
        let f = factory(StaticSession::anonymous());
        let err = f.denied(
            SecurityRuleContext::new(Operation::Create, "users/u1/profile/u1")
                .with_payload(Some(json!({"name": "Ada"}))),
        );

        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.path(), "users/u1/profile/u1");
        assert!(err.message().starts_with("Missing or insufficient permissions"));
        assert!(err
            .message()
            .contains("/databases/(default)/documents/users/u1/profile/u1"));
        assert!(err.message().contains("\"method\": \"create\""));
        assert!(err.message().contains("\"name\": \"Ada\""));
        assert!(err.message().contains("\"auth\": null"));
    }

    #[test]
    fn test_message_is_deterministic() {
        let f = factory(StaticSession::signed_in(Principal::new("u1")));
        let ctx = SecurityRuleContext::new(Operation::List, "subjects");
        assert_eq!(f.denied(ctx.clone()).message(), f.denied(ctx).message());
    }

    #[test]
    fn test_auth_claims_attached() {
        let principal = Principal::new("u1")
            .with_display_name("Ada")
            .with_email("ada@example.com", true)
            .with_provider("password", "ada@example.com");
        let f = factory(StaticSession::signed_in(principal));

        let err = f.denied(SecurityRuleContext::new(Operation::Get, "users/u1"));
        let auth = err.request().auth.as_ref().unwrap();
        assert_eq!(auth.uid, "u1");
        assert_eq!(auth.token.sub, "u1");
        assert_eq!(auth.token.name.as_deref(), Some("Ada"));
        assert!(auth.token.email_verified);
        assert_eq!(auth.token.provider_claims.sign_in_provider, "password");
        assert_eq!(
            auth.token.provider_claims.identities.get("password"),
            Some(&vec!["ada@example.com".to_string()])
        );
        assert!(err.message().contains("\"firebase\""));
    }

    #[test]
    fn test_identity_failure_degrades_to_anonymous() {
        let f = factory(BrokenSession);
        let err = f.denied(SecurityRuleContext::new(Operation::Get, "users/u1"));
        assert!(err.request().auth.is_none());
    }

    #[test]
    fn test_transport_error_same_shape() {
        let f = factory(StaticSession::anonymous());
        let err = f.from_store_error(
            SecurityRuleContext::new(Operation::List, "subjects"),
            &StoreError::Unavailable("connection reset".into()),
        );
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.operation(), Operation::List);
        assert!(err.message().contains("connection reset"));
        assert!(err.kind().is_broadcast());
    }

    #[test]
    fn test_no_resource_without_payload() {
        let f = factory(StaticSession::anonymous());
        let err = f.denied(SecurityRuleContext::new(Operation::Delete, "users/u1"));
        assert!(err.request().resource.is_none());
        assert!(!err.message().contains("\"resource\""));
    }
}
