//! Block-aware fan-out gate.
//!
//! Consulted before any chat-message or call-initiation relay. Block
//! relationships are loaded lazily from the store on a user's first
//! reference and then served from the in-process cache; block/unblock
//! actions mutate the cache synchronously so they take effect for the
//! very next message, with the store write trailing in the background.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use ringline_shared::types::UserId;
use ringline_store::BlockStore;

use crate::persist::spawn_write;

pub struct BlockGate {
    store: Arc<dyn BlockStore>,
    cache: RwLock<HashMap<UserId, HashSet<UserId>>>,
}

impl BlockGate {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// True if either direction of the block relationship exists.
    pub async fn is_blocked(&self, a: &UserId, b: &UserId) -> bool {
        self.ensure_loaded(a).await;
        self.ensure_loaded(b).await;

        let cache = self.cache.read().await;
        let a_blocks_b = cache.get(a).is_some_and(|set| set.contains(b));
        let b_blocks_a = cache.get(b).is_some_and(|set| set.contains(a));
        a_blocks_b || b_blocks_a
    }

    /// Record a block. Effective immediately for subsequent relays.
    pub async fn block(&self, user: &UserId, blocked: &UserId) {
        self.ensure_loaded(user).await;

        {
            let mut cache = self.cache.write().await;
            cache
                .entry(user.clone())
                .or_default()
                .insert(blocked.clone());
        }

        debug!(
            user = %user.short(),
            blocked = %blocked.short(),
            "Block recorded"
        );

        let store = Arc::clone(&self.store);
        let user = user.clone();
        let blocked = blocked.clone();
        spawn_write("persist-block", move || store.add(&user, &blocked));
    }

    /// Lift a block. Effective immediately.
    pub async fn unblock(&self, user: &UserId, blocked: &UserId) {
        self.ensure_loaded(user).await;

        {
            let mut cache = self.cache.write().await;
            if let Some(set) = cache.get_mut(user) {
                set.remove(blocked);
            }
        }

        debug!(
            user = %user.short(),
            unblocked = %blocked.short(),
            "Block lifted"
        );

        let store = Arc::clone(&self.store);
        let user = user.clone();
        let blocked = blocked.clone();
        spawn_write("persist-unblock", move || store.remove(&user, &blocked));
    }

    /// Evict a user's entry, e.g. when their last connection closes.
    pub async fn evict(&self, user: &UserId) {
        self.cache.write().await.remove(user);
    }

    /// Load a user's block set from the store on first reference. The
    /// read happens on the blocking pool; a store failure degrades to an
    /// empty set rather than rejecting traffic.
    async fn ensure_loaded(&self, user: &UserId) {
        {
            let cache = self.cache.read().await;
            if cache.contains_key(user) {
                return;
            }
        }

        let store = Arc::clone(&self.store);
        let lookup = user.clone();
        let loaded =
            tokio::task::spawn_blocking(move || store.blocked_by(&lookup)).await;

        let set = match loaded {
            Ok(Ok(set)) => set,
            Ok(Err(e)) => {
                warn!(user = %user.short(), error = %e, "Block lookup failed, assuming empty");
                HashSet::new()
            }
            Err(e) => {
                warn!(user = %user.short(), error = %e, "Block lookup task failed, assuming empty");
                HashSet::new()
            }
        };

        let mut cache = self.cache.write().await;
        // A block recorded while we were loading wins over the snapshot.
        cache.entry(user.clone()).or_insert(set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_store::MemoryStore;
    use std::time::Duration;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_lazy_load_then_enforce() {
        let store = Arc::new(MemoryStore::new());
        let alice = UserId::new("u-alice");
        let bob = UserId::new("u-bob");

        // The relationship exists only in the store; the cache is cold.
        store.add(&alice, &bob).unwrap();
        let gate = BlockGate::new(store);

        assert!(gate.is_blocked(&alice, &bob).await);
        // Either direction trips the gate.
        assert!(gate.is_blocked(&bob, &alice).await);
    }

    #[tokio::test]
    async fn test_unrelated_users_pass() {
        let gate = BlockGate::new(Arc::new(MemoryStore::new()));
        assert!(
            !gate
                .is_blocked(&UserId::new("u-alice"), &UserId::new("u-bob"))
                .await
        );
    }

    #[tokio::test]
    async fn test_block_takes_effect_immediately() {
        let store = Arc::new(MemoryStore::new());
        let gate = BlockGate::new(store.clone());
        let alice = UserId::new("u-alice");
        let bob = UserId::new("u-bob");

        assert!(!gate.is_blocked(&alice, &bob).await);

        gate.block(&alice, &bob).await;
        assert!(gate.is_blocked(&alice, &bob).await);

        // The store write trails in the background.
        wait_until(|| store.blocked_by(&alice).unwrap().contains(&bob));
    }

    #[tokio::test]
    async fn test_unblock_takes_effect_immediately() {
        let store = Arc::new(MemoryStore::new());
        let gate = BlockGate::new(store.clone());
        let alice = UserId::new("u-alice");
        let bob = UserId::new("u-bob");

        gate.block(&alice, &bob).await;
        gate.unblock(&alice, &bob).await;

        assert!(!gate.is_blocked(&alice, &bob).await);
        wait_until(|| !store.blocked_by(&alice).unwrap().contains(&bob));
    }

    #[tokio::test]
    async fn test_evicted_entry_reloads_from_store() {
        let store = Arc::new(MemoryStore::new());
        let gate = BlockGate::new(store.clone());
        let alice = UserId::new("u-alice");
        let bob = UserId::new("u-bob");

        gate.block(&alice, &bob).await;
        wait_until(|| store.blocked_by(&alice).unwrap().contains(&bob));

        gate.evict(&alice).await;
        // The next reference lazily reloads the persisted relationship.
        assert!(gate.is_blocked(&alice, &bob).await);
    }
}
