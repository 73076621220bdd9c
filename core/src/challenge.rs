//! `WWW-Authenticate` challenge parsing.
//!
//! # Design
//! A stateless pure function from the raw header value to a structured
//! [`Challenge`]. Unrecognized schemes and Digest challenges missing their
//! required fields fail with `MalformedChallenge`; unknown `qop` tokens are
//! treated as absence of quality-of-protection rather than an error, since
//! servers in the wild vary. Challenges are parsed fresh from every 401/407
//! and never persisted across requests.

use crate::error::ClientError;
use crate::realm::AuthScheme;

/// Quality of protection requested by a Digest challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    Auth,
}

/// A parsed authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: AuthScheme,
    pub realm: String,
    pub nonce: Option<String>,
    pub opaque: Option<String>,
    pub qop: Option<Qop>,
    pub algorithm: Option<String>,
}

impl Challenge {
    /// Parse a raw `WWW-Authenticate` (or `Proxy-Authenticate`) value.
    pub fn parse(raw: &str) -> Result<Challenge, ClientError> {
        let raw = raw.trim();
        let (scheme_token, params) = match raw.split_once(char::is_whitespace) {
            Some((s, rest)) => (s, rest),
            None => (raw, ""),
        };

        let scheme = if scheme_token.eq_ignore_ascii_case("basic") {
            AuthScheme::Basic
        } else if scheme_token.eq_ignore_ascii_case("digest") {
            AuthScheme::Digest
        } else {
            return Err(ClientError::MalformedChallenge(format!(
                "unrecognized scheme: {scheme_token}"
            )));
        };

        let params = parse_params(params);
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };

        let realm = get("realm").unwrap_or_default();
        let nonce = get("nonce");
        let opaque = get("opaque");
        let algorithm = get("algorithm");
        // Unknown qop values fall back to the simplest variant (no qop).
        let qop = get("qop").and_then(|v| {
            v.split(',')
                .map(str::trim)
                .any(|t| t.eq_ignore_ascii_case("auth"))
                .then_some(Qop::Auth)
        });

        if scheme == AuthScheme::Digest {
            if nonce.as_deref().map_or(true, str::is_empty) {
                return Err(ClientError::MalformedChallenge(
                    "digest challenge is missing a nonce".into(),
                ));
            }
            if realm.is_empty() {
                return Err(ClientError::MalformedChallenge(
                    "digest challenge is missing a realm".into(),
                ));
            }
        }

        Ok(Challenge {
            scheme,
            realm,
            nonce,
            opaque,
            qop,
            algorithm,
        })
    }
}

/// Split `k1="v1", k2=v2, ...` into pairs, honoring quoted values.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();

        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            value = stripped[..end].to_string();
            rest = stripped.get(end + 1..).unwrap_or("");
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = rest.get(end..).unwrap_or("");
        }
        if !key.is_empty() {
            params.push((key, value));
        }
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }
    params
}
