use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::identity::AccessToken;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("session expired; Klaviyo login required")]
    Expired,
}

/// Collaborator seam: resolve a caller-presented session identifier to a
/// currently-valid upstream access token. The OAuth/PKCE machinery that
/// populates sessions lives outside this service.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, session_id: &str) -> Result<AccessToken, SessionError>;
}

struct StoredSession {
    token: AccessToken,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<HashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        session_id: impl Into<String>,
        token: AccessToken,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let mut sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session_id.into(), StoredSession { token, expires_at });
    }
}

#[async_trait]
impl SessionResolver for InMemorySessionStore {
    async fn resolve(&self, session_id: &str) -> Result<AccessToken, SessionError> {
        let mut sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let expires_at = match sessions.get(session_id) {
            Some(session) => session.expires_at,
            None => return Err(SessionError::NotAuthenticated),
        };

        if let Some(expires_at) = expires_at {
            if expires_at <= Utc::now() {
                sessions.remove(session_id);
                return Err(SessionError::Expired);
            }
        }

        sessions
            .get(session_id)
            .map(|session| session.token.clone())
            .ok_or(SessionError::NotAuthenticated)
    }
}
