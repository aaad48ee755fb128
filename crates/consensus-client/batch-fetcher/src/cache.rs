//! LRU cache of settled values and in-flight requests.

use std::{collections::HashMap, hash::Hash, num::NonZeroUsize, sync::Arc};

use consensus_client_common::ConsensusPromise;
use consensus_client_promise::Promise;
use lru::LruCache;
use parking_lot::Mutex;

/// Settled values bounded by the LRU, and in-flight requests that are never evicted.
struct Slots<K, V> {
    ready: LruCache<K, V>,
    pending: HashMap<K, ConsensusPromise<V>>,
}

/// Cache where each key has at most one request in flight.
///
/// A miss records the request's promise as pending, so concurrent callers for the same key
/// share it however many other keys are in flight. On settlement the value moves into the
/// LRU if the caller's retain predicate accepts it, and is dropped otherwise. Failures are
/// never kept.
pub(crate) struct CacheTable<K, V> {
    slots: Arc<Mutex<Slots<K, V>>>,
}

impl<K, V> CacheTable<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                ready: LruCache::new(capacity),
                pending: HashMap::new(),
            })),
        }
    }

    /// Returns the cached value, the in-flight request, or the promise produced by `fetch`.
    ///
    /// `retain` decides, once the fetch resolves, whether the value may be served from cache
    /// from then on.
    pub(crate) fn get_or_fetch<F, R>(&self, key: K, fetch: F, retain: R) -> ConsensusPromise<V>
    where
        F: FnOnce() -> ConsensusPromise<V>,
        R: FnOnce(&V) -> bool + Send + 'static,
    {
        let promise = {
            let mut slots = self.slots.lock();
            if let Some(value) = slots.ready.get(&key) {
                return Promise::resolved(value.clone());
            }
            if let Some(pending) = slots.pending.get(&key) {
                return pending.clone();
            }
            let promise = fetch();
            slots.pending.insert(key.clone(), promise.clone());
            promise
        };

        // Registered after unlocking: the continuation runs inline if the fetch already
        // settled, and it takes the lock itself.
        let slots = Arc::clone(&self.slots);
        let ours = promise.clone();
        promise.then(move |outcome| {
            let mut slots = slots.lock();
            // The request may have been purged and replaced by a newer one meanwhile.
            let still_ours = slots.pending.get(&key).is_some_and(|p| p.same_as(&ours));
            if !still_ours {
                return;
            }
            slots.pending.remove(&key);
            if let Ok(value) = outcome {
                if retain(value) {
                    slots.ready.put(key, value.clone());
                }
            }
        });

        promise
    }

    #[cfg(test)]
    pub(crate) fn get_ready(&self, key: &K) -> Option<V> {
        self.slots.lock().ready.peek(key).cloned()
    }

    /// Forgets the cached value and any in-flight request for `key`.
    pub(crate) fn purge(&self, key: &K) {
        let mut slots = self.slots.lock();
        slots.ready.pop(key);
        slots.pending.remove(key);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let slots = self.slots.lock();
        slots.ready.len() + slots.pending.len()
    }
}
