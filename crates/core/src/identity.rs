use std::fmt::Write as _;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Bearer credential for the upstream marketing API. Scoped to a single chat
/// turn: the caller resolves it from its session machinery and threads it
/// explicitly through every adapter call, so no request-ambient state exists
/// for another turn to observe.
#[derive(Clone, Debug)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().into())
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret() // ubs:ignore
    }
}

/// Caller identity derived from the access token. Always a one-way hash; the
/// raw token is never used as a map key or logged.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn from_token(token: &AccessToken) -> Self {
        let digest = Sha256::digest(token.expose().as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
