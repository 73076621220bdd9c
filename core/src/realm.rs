//! Credential store for a single logical request.
//!
//! # Design
//! A `Realm` is immutable once built and owned exclusively by the request
//! that carries it — it is never shared or cached across requests, so there
//! is no nonce state here. Construction validates that the principal and
//! secret are non-empty; it deliberately does not cross-check `realm_name`
//! against the eventual server challenge (parity across schemes is
//! established at challenge time).

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Authentication scheme preference, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthScheme {
    Basic,
    Digest,
}

/// Immutable credentials plus negotiation preferences for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    principal: String,
    secret: String,
    realm_name: Option<String>,
    preemptive: bool,
    scheme: AuthScheme,
}

impl Realm {
    pub fn builder() -> RealmBuilder {
        RealmBuilder::default()
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Advisory target realm; the server challenge's realm is authoritative
    /// for digest computation.
    pub fn realm_name(&self) -> Option<&str> {
        self.realm_name.as_deref()
    }

    pub fn preemptive(&self) -> bool {
        self.preemptive
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }
}

/// Builder mirroring the configuration surface: principal, secret,
/// `use_preemptive_auth`, scheme.
#[derive(Debug, Clone)]
pub struct RealmBuilder {
    principal: String,
    secret: String,
    realm_name: Option<String>,
    preemptive: bool,
    scheme: AuthScheme,
}

impl Default for RealmBuilder {
    fn default() -> Self {
        Self {
            principal: String::new(),
            secret: String::new(),
            realm_name: None,
            preemptive: false,
            scheme: AuthScheme::Basic,
        }
    }
}

impl RealmBuilder {
    pub fn principal(mut self, principal: &str) -> Self {
        self.principal = principal.to_string();
        self
    }

    pub fn secret(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    pub fn realm_name(mut self, name: &str) -> Self {
        self.realm_name = Some(name.to_string());
        self
    }

    pub fn use_preemptive_auth(mut self, preemptive: bool) -> Self {
        self.preemptive = preemptive;
        self
    }

    pub fn scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Validate and freeze the realm.
    pub fn build(self) -> Result<Realm, ClientError> {
        if self.principal.is_empty() {
            return Err(ClientError::InvalidRealm("principal must not be empty".into()));
        }
        if self.secret.is_empty() {
            return Err(ClientError::InvalidRealm("secret must not be empty".into()));
        }
        Ok(Realm {
            principal: self.principal,
            secret: self.secret,
            realm_name: self.realm_name,
            preemptive: self.preemptive,
            scheme: self.scheme,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_validates_principal_and_secret() {
        let err = Realm::builder().secret("pw").build().unwrap_err();
        assert!(matches!(err, ClientError::InvalidRealm(_)));

        let err = Realm::builder().principal("user").build().unwrap_err();
        assert!(matches!(err, ClientError::InvalidRealm(_)));
    }

    #[test]
    fn build_defaults_to_non_preemptive_basic() {
        let realm = Realm::builder().principal("user").secret("admin").build().unwrap();
        assert_eq!(realm.scheme(), AuthScheme::Basic);
        assert!(!realm.preemptive());
        assert!(realm.realm_name().is_none());
    }

    #[test]
    fn build_keeps_configured_fields() {
        let realm = Realm::builder()
            .principal("user")
            .secret("admin")
            .realm_name("MyRealm")
            .use_preemptive_auth(true)
            .scheme(AuthScheme::Digest)
            .build()
            .unwrap();
        assert_eq!(realm.realm_name(), Some("MyRealm"));
        assert!(realm.preemptive());
        assert_eq!(realm.scheme(), AuthScheme::Digest);
    }
}
