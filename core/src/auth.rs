//! Authentication negotiation state machine.
//!
//! # Design
//! One [`AuthNegotiator`] lives for exactly one logical request. It decides
//! whether credentials go out preemptively, computes the scheme-specific
//! `Authorization` value when a challenge arrives, and enforces the
//! retry-once rule: a second unauthorized response after a credentialed
//! retry is terminal, regardless of whether the challenge differs.
//!
//! Preemptive mode applies to Basic only. A preemptive Digest header would
//! require a nonce cached from a previous exchange, which this core does
//! not retain, so a Digest realm with the preemptive flag still starts with
//! a bare request and follows the normal challenge flow.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use md5::{Digest as _, Md5};
use uuid::Uuid;

use crate::challenge::{Challenge, Qop};
use crate::error::ClientError;
use crate::realm::{AuthScheme, Realm};

/// Where the negotiation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Idle,
    AwaitingResponse { credentials_sent: bool },
    Retried,
    Failed,
}

pub(crate) struct AuthNegotiator {
    realm: Option<Realm>,
    state: AuthState,
}

impl AuthNegotiator {
    pub(crate) fn new(realm: Option<Realm>) -> Self {
        Self {
            realm,
            state: AuthState::Idle,
        }
    }

    /// Header value for the first outgoing request, computed from locally
    /// known information only. `None` means the first request goes out bare.
    pub(crate) fn preemptive_header(&mut self) -> Option<String> {
        let header = match &self.realm {
            Some(realm) if realm.preemptive() && realm.scheme() == AuthScheme::Basic => {
                Some(basic_header(realm.principal(), realm.secret()))
            }
            _ => None,
        };
        self.state = AuthState::AwaitingResponse {
            credentials_sent: header.is_some(),
        };
        header
    }

    /// React to a 401/407. Returns `Some(header)` to retry once with
    /// credentials, `Ok(None)` when no credentials are configured (the
    /// unauthorized response is surfaced to the caller as-is), or a terminal
    /// error when the retry budget is spent or the challenge is malformed.
    pub(crate) fn on_unauthorized(
        &mut self,
        raw_challenge: Option<&str>,
        method: &str,
        uri: &str,
    ) -> Result<Option<String>, ClientError> {
        let Some(realm) = &self.realm else {
            return Ok(None);
        };
        match self.state {
            AuthState::Retried | AuthState::Failed => {
                self.state = AuthState::Failed;
                return Err(ClientError::AuthFailure);
            }
            AuthState::Idle | AuthState::AwaitingResponse { .. } => {}
        }

        let raw = raw_challenge.ok_or_else(|| {
            ClientError::MalformedChallenge("unauthorized response carried no challenge".into())
        })?;
        let challenge = Challenge::parse(raw)?;
        tracing::debug!(scheme = ?challenge.scheme, realm = %challenge.realm, "retrying with credentials");

        // The challenge's scheme is authoritative, not the realm's preference.
        let header = match challenge.scheme {
            AuthScheme::Basic => basic_header(realm.principal(), realm.secret()),
            AuthScheme::Digest => {
                let cnonce = generate_cnonce();
                digest_header(realm, &challenge, method, uri, &cnonce, 1)?
            }
        };
        self.state = AuthState::Retried;
        Ok(Some(header))
    }
}

/// `Basic base64(principal:secret)`.
fn basic_header(principal: &str, secret: &str) -> String {
    let encoded = BASE64_STANDARD.encode(format!("{principal}:{secret}"));
    format!("Basic {encoded}")
}

/// Fresh client nonce for each credentialed retry.
fn generate_cnonce() -> String {
    Uuid::new_v4().simple().to_string()
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// RFC 2617 digest response: a keyed hash over method, URI, realm, nonce,
/// and secret. With `qop=auth` the client nonce and nonce count join the
/// hash; without qop the simplest variant is used. `sess` selects the
/// `MD5-sess` session key, which folds the nonces into HA1.
fn digest_response(
    realm: &Realm,
    challenge: &Challenge,
    method: &str,
    uri: &str,
    cnonce: &str,
    nc: u32,
    sess: bool,
) -> String {
    let nonce = challenge.nonce.as_deref().unwrap_or_default();
    let mut ha1 = md5_hex(&format!(
        "{}:{}:{}",
        realm.principal(),
        challenge.realm,
        realm.secret()
    ));
    if sess {
        ha1 = md5_hex(&format!("{ha1}:{nonce}:{cnonce}"));
    }
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    match challenge.qop {
        Some(Qop::Auth) => md5_hex(&format!("{ha1}:{nonce}:{nc:08x}:{cnonce}:auth:{ha2}")),
        None => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
    }
}

/// The challenge's algorithm token decides the session-key variant.
/// Absent means plain MD5; anything other than MD5 or MD5-sess would
/// produce a response the server cannot verify, so it is rejected.
fn digest_session(challenge: &Challenge) -> Result<bool, ClientError> {
    match challenge.algorithm.as_deref() {
        None => Ok(false),
        Some(a) if a.eq_ignore_ascii_case("md5") => Ok(false),
        Some(a) if a.eq_ignore_ascii_case("md5-sess") => Ok(true),
        Some(other) => Err(ClientError::MalformedChallenge(format!(
            "unsupported digest algorithm: {other}"
        ))),
    }
}

fn digest_header(
    realm: &Realm,
    challenge: &Challenge,
    method: &str,
    uri: &str,
    cnonce: &str,
    nc: u32,
) -> Result<String, ClientError> {
    let nonce = challenge.nonce.as_deref().ok_or_else(|| {
        ClientError::MalformedChallenge("digest challenge is missing a nonce".into())
    })?;
    let sess = digest_session(challenge)?;
    let response = digest_response(realm, challenge, method, uri, cnonce, nc, sess);

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
        realm.principal(),
        challenge.realm,
        nonce,
        uri,
        response,
        if sess { "MD5-sess" } else { "MD5" },
    );
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    if challenge.qop == Some(Qop::Auth) {
        header.push_str(&format!(", qop=auth, nc={nc:08x}, cnonce=\"{cnonce}\""));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm(preemptive: bool, scheme: AuthScheme) -> Realm {
        Realm::builder()
            .principal("user")
            .secret("admin")
            .use_preemptive_auth(preemptive)
            .scheme(scheme)
            .build()
            .unwrap()
    }

    fn digest_challenge(nonce: &str) -> Challenge {
        Challenge::parse(&format!(
            r#"Digest realm="MyRealm", nonce="{nonce}", qop="auth""#
        ))
        .unwrap()
    }

    #[test]
    fn preemptive_basic_attaches_credentials() {
        let mut n = AuthNegotiator::new(Some(realm(true, AuthScheme::Basic)));
        let header = n.preemptive_header().unwrap();
        // base64("user:admin")
        assert_eq!(header, "Basic dXNlcjphZG1pbg==");
    }

    #[test]
    fn preemptive_digest_is_not_attempted() {
        let mut n = AuthNegotiator::new(Some(realm(true, AuthScheme::Digest)));
        assert!(n.preemptive_header().is_none());
    }

    #[test]
    fn non_preemptive_sends_nothing_first() {
        let mut n = AuthNegotiator::new(Some(realm(false, AuthScheme::Basic)));
        assert!(n.preemptive_header().is_none());
    }

    #[test]
    fn challenge_triggers_exactly_one_retry() {
        let mut n = AuthNegotiator::new(Some(realm(false, AuthScheme::Basic)));
        n.preemptive_header();
        let header = n
            .on_unauthorized(Some(r#"Basic realm="MyRealm""#), "GET", "/")
            .unwrap();
        assert!(header.is_some());

        let err = n
            .on_unauthorized(Some(r#"Basic realm="MyRealm""#), "GET", "/")
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthFailure));
    }

    #[test]
    fn second_unauthorized_is_terminal_even_with_different_challenge() {
        let mut n = AuthNegotiator::new(Some(realm(false, AuthScheme::Digest)));
        n.preemptive_header();
        n.on_unauthorized(Some(r#"Digest realm="r", nonce="one""#), "GET", "/")
            .unwrap();
        let err = n
            .on_unauthorized(Some(r#"Digest realm="r", nonce="two""#), "GET", "/")
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthFailure));
    }

    #[test]
    fn no_realm_surfaces_unauthorized_response() {
        let mut n = AuthNegotiator::new(None);
        n.preemptive_header();
        let header = n
            .on_unauthorized(Some(r#"Basic realm="MyRealm""#), "GET", "/")
            .unwrap();
        assert!(header.is_none());
    }

    #[test]
    fn missing_challenge_header_is_malformed() {
        let mut n = AuthNegotiator::new(Some(realm(false, AuthScheme::Basic)));
        n.preemptive_header();
        let err = n.on_unauthorized(None, "GET", "/").unwrap_err();
        assert!(matches!(err, ClientError::MalformedChallenge(_)));
    }

    #[test]
    fn digest_response_is_deterministic_for_fixed_inputs() {
        let r = realm(false, AuthScheme::Digest);
        let ch = digest_challenge("abc");
        let first = digest_response(&r, &ch, "GET", "/", "cnonce1", 1, false);
        let second = digest_response(&r, &ch, "GET", "/", "cnonce1", 1, false);
        assert_eq!(first, second);
    }

    #[test]
    fn digest_response_differs_with_nonce() {
        let r = realm(false, AuthScheme::Digest);
        let a = digest_response(&r, &digest_challenge("abc"), "GET", "/", "cn", 1, false);
        let b = digest_response(&r, &digest_challenge("def"), "GET", "/", "cn", 1, false);
        assert_ne!(a, b);
    }

    #[test]
    fn md5_sess_algorithm_changes_the_session_key() {
        let r = realm(false, AuthScheme::Digest);
        let ch = Challenge::parse(
            r#"Digest realm="MyRealm", nonce="abc", qop="auth", algorithm=MD5-sess"#,
        )
        .unwrap();
        let plain = digest_response(&r, &ch, "GET", "/", "cn", 1, false);
        let sess = digest_response(&r, &ch, "GET", "/", "cn", 1, true);
        assert_ne!(plain, sess);

        let header = digest_header(&r, &ch, "GET", "/", "cn", 1).unwrap();
        assert!(header.contains("algorithm=MD5-sess"));
        assert!(header.contains(&format!("response=\"{sess}\"")));
    }

    #[test]
    fn unsupported_digest_algorithm_is_malformed() {
        let r = realm(false, AuthScheme::Digest);
        let ch = Challenge::parse(
            r#"Digest realm="MyRealm", nonce="abc", algorithm=SHA-256"#,
        )
        .unwrap();
        let err = digest_header(&r, &ch, "GET", "/", "cn", 1).unwrap_err();
        assert!(matches!(err, ClientError::MalformedChallenge(_)));
    }

    #[test]
    fn generated_cnonce_is_non_empty_and_fresh() {
        let a = generate_cnonce();
        let b = generate_cnonce();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn digest_header_includes_qop_fields_only_when_requested() {
        let r = realm(false, AuthScheme::Digest);
        let with_qop = digest_header(&r, &digest_challenge("abc"), "GET", "/", "cn", 1).unwrap();
        assert!(with_qop.contains("qop=auth"));
        assert!(with_qop.contains("nc=00000001"));
        assert!(with_qop.contains("cnonce=\"cn\""));

        let ch = Challenge::parse(r#"Digest realm="r", nonce="abc""#).unwrap();
        let without = digest_header(&r, &ch, "GET", "/", "cn", 1).unwrap();
        assert!(!without.contains("qop"));
    }
}
