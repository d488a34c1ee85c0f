//! Session/identity provider seam.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A sign-in method linked to a principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider_id: String,
    pub uid: String,
}

/// The authenticated user, as claimed by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub provider_data: Vec<ProviderInfo>,
    pub tenant_id: Option<String>,
}

impl Principal {
    /// Principal with only a subject id.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            email_verified: false,
            phone_number: None,
            provider_data: Vec::new(),
            tenant_id: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = Some(email.into());
        self.email_verified = verified;
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>, uid: impl Into<String>) -> Self {
        self.provider_data.push(ProviderInfo {
            provider_id: provider_id.into(),
            uid: uid.into(),
        });
        self
    }

    /// First linked provider, or `custom` when none is linked.
    pub fn sign_in_provider(&self) -> &str {
        self.provider_data
            .first()
            .map(|p| p.provider_id.as_str())
            .filter(|id| !id.is_empty())
            .unwrap_or("custom")
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("identity provider not initialized")]
    NotInitialized,

    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

/// Answers "who is signed in right now".
pub trait SessionProvider: Send + Sync {
    /// `Ok(None)` when anonymous.
    fn current_principal(&self) -> Result<Option<Principal>, SessionError>;
}

/// Session whose principal is set explicitly.
#[derive(Default)]
pub struct StaticSession {
    principal: RwLock<Option<Principal>>,
}

impl StaticSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(principal: Principal) -> Self {
        Self {
            principal: RwLock::new(Some(principal)),
        }
    }

    pub fn sign_in(&self, principal: Principal) {
        *self.principal.write() = Some(principal);
    }

    pub fn sign_out(&self) {
        *self.principal.write() = None;
    }
}

impl SessionProvider for StaticSession {
    fn current_principal(&self) -> Result<Option<Principal>, SessionError> {
        Ok(self.principal.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_provider_fallback() {
        let p = Principal::new("u1");
        assert_eq!(p.sign_in_provider(), "custom");

        let p = p.with_provider("google.com", "g-1");
        assert_eq!(p.sign_in_provider(), "google.com");
    }

    #[test]
    fn test_static_session_transitions() {
        let session = StaticSession::anonymous();
        assert!(session.current_principal().unwrap().is_none());

        session.sign_in(Principal::new("u1"));
        assert_eq!(session.current_principal().unwrap().unwrap().uid, "u1");

        session.sign_out();
        assert!(session.current_principal().unwrap().is_none());
    }
}
