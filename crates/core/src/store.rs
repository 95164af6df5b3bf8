use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::actions::{ActionParams, ApprovalId, PendingAction};
use crate::identity::IdentityKey;

const APPROVAL_ID_LEN: usize = 10;

/// Registry of staged actions awaiting approval. `take` is the atomic
/// read-and-delete that enforces the single-use invariant: a consumed or
/// unknown id resolves to `None`.
pub trait PendingActionStore: Send + Sync {
    fn mint(&self, params: ActionParams) -> PendingAction;
    fn take(&self, id: &ApprovalId) -> Option<PendingAction>;
    fn pending_count(&self) -> usize;
}

/// Per-identity scratch memory for implicit chaining ("the list we just
/// made"). Keyed by the token hash, never the raw token.
pub trait IdentityContextStore: Send + Sync {
    fn last_list_id(&self, key: &IdentityKey) -> Option<String>;
    fn record_list(&self, key: &IdentityKey, list_id: &str);
}

struct StoredPending {
    action: PendingAction,
    staged_at: Instant,
}

/// In-memory pending-action registry. Entries survive until executed, until
/// the optional TTL elapses, or until process restart. Expired entries are
/// swept lazily on the next store access.
pub struct InMemoryPendingActionStore {
    ttl: Option<Duration>,
    inner: Mutex<HashMap<String, StoredPending>>,
}

impl InMemoryPendingActionStore {
    pub fn new() -> Self {
        Self { ttl: None, inner: Mutex::new(HashMap::new()) }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl), inner: Mutex::new(HashMap::new()) }
    }

    fn sweep(&self, entries: &mut HashMap<String, StoredPending>) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let now = Instant::now();
        entries.retain(|_, stored| now.duration_since(stored.staged_at) < ttl);
    }

    fn generate_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(APPROVAL_ID_LEN)
            .map(char::from)
            .collect()
    }
}

impl Default for InMemoryPendingActionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingActionStore for InMemoryPendingActionStore {
    fn mint(&self, params: ActionParams) -> PendingAction {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut entries);

        let mut id = Self::generate_id();
        while entries.contains_key(&id) {
            id = Self::generate_id();
        }

        let description = params.describe();
        let action = PendingAction { id: ApprovalId(id.clone()), params, description };
        entries.insert(id, StoredPending { action: action.clone(), staged_at: Instant::now() });
        action
    }

    fn take(&self, id: &ApprovalId) -> Option<PendingAction> {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut entries);
        entries.remove(&id.0).map(|stored| stored.action)
    }

    fn pending_count(&self) -> usize {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut entries);
        entries.len()
    }
}

#[derive(Default)]
pub struct InMemoryIdentityContextStore {
    inner: Mutex<HashMap<IdentityKey, String>>,
}

impl InMemoryIdentityContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityContextStore for InMemoryIdentityContextStore {
    fn last_list_id(&self, key: &IdentityKey) -> Option<String> {
        let entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn record_list(&self, key: &IdentityKey, list_id: &str) {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.clone(), list_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        IdentityContextStore, InMemoryIdentityContextStore, InMemoryPendingActionStore,
        PendingActionStore,
    };
    use crate::actions::{ActionParams, ApprovalId};
    use crate::identity::{AccessToken, IdentityKey};

    fn list_params(name: &str) -> ActionParams {
        ActionParams::CreateList { list_name: name.to_string() }
    }

    #[test]
    fn minted_actions_carry_fresh_unique_ids() {
        let store = InMemoryPendingActionStore::new();
        let first = store.mint(list_params("VIP"));
        let second = store.mint(list_params("Newsletter"));

        assert_ne!(first.id, second.id);
        assert!(!first.id.0.is_empty());
        assert_eq!(store.pending_count(), 2);
    }

    #[test]
    fn take_consumes_exactly_once() {
        let store = InMemoryPendingActionStore::new();
        let staged = store.mint(list_params("VIP"));

        let consumed = store.take(&staged.id).expect("first take should succeed");
        assert_eq!(consumed.params, list_params("VIP"));
        assert!(store.take(&staged.id).is_none(), "second take must fail");
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let store = InMemoryPendingActionStore::new();
        store.mint(list_params("VIP"));
        assert!(store.take(&ApprovalId("nope".to_string())).is_none());
    }

    #[test]
    fn expired_entries_are_swept() {
        let store = InMemoryPendingActionStore::with_ttl(Duration::from_millis(0));
        let staged = store.mint(list_params("VIP"));

        std::thread::sleep(Duration::from_millis(5));
        assert!(store.take(&staged.id).is_none(), "expired entry must not execute");
    }

    #[test]
    fn identity_context_tracks_last_list_per_identity() {
        let store = InMemoryIdentityContextStore::new();
        let alice = IdentityKey::from_token(&AccessToken::new("token-alice"));
        let bob = IdentityKey::from_token(&AccessToken::new("token-bob"));

        store.record_list(&alice, "L1");
        store.record_list(&bob, "L2");
        store.record_list(&alice, "L3");

        assert_eq!(store.last_list_id(&alice).as_deref(), Some("L3"));
        assert_eq!(store.last_list_id(&bob).as_deref(), Some("L2"));
    }
}
