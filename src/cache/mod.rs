//! Keyed cache with get-before-set.
//!
//! Readers asking for a key that is not computed yet get a pending promise
//! that the next `set` for that key resolves, so concurrent readers of a
//! value being computed once never poll.
//!
//! ```text
//! get(k) ──▶ present? ──yes──▶ resolved promise
//!              │
//!              no ──▶ pending[k] += deferred ◀── set(k, v) resolves all
//! ```

use std::fmt::Debug;
use std::hash::Hash;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::Error;
use crate::sync::{Deferred, Promise};

/// Cache of computed items keyed by `K`.
pub struct KeyedCache<K, T> {
    state: Mutex<CacheState<K, T>>,
}

struct CacheState<K, T> {
    items: FxHashMap<K, Stamped<T>>,
    /// Written-at marker of the item last handed out per key
    served: FxHashMap<K, u64>,
    /// Readers waiting for a key that has no item yet
    pending: FxHashMap<K, Vec<Deferred<T>>>,
    clock: u64,
}

struct Stamped<T> {
    item: T,
    written: u64,
}

impl<K, T> KeyedCache<K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                items: FxHashMap::default(),
                served: FxHashMap::default(),
                pending: FxHashMap::default(),
                clock: 0,
            }),
        }
    }

    /// Store `item` and wake every reader waiting on `key`.
    pub fn set(&self, key: K, item: T) {
        let waiters = {
            let mut state = self.state.lock();
            state.clock += 1;
            let written = state.clock;
            state.items.insert(
                key.clone(),
                Stamped {
                    item: item.clone(),
                    written,
                },
            );
            state.pending.remove(&key).unwrap_or_default()
        };

        for waiter in waiters {
            waiter.resolve(item.clone());
        }
    }

    /// The current item, or a promise for the next `set` of `key`.
    pub fn get(&self, key: &K) -> Promise<T> {
        let mut state = self.state.lock();
        let state = &mut *state;

        if let Some(stamped) = state.items.get(key) {
            let served = state.served.get(key).copied().unwrap_or(0);
            if stamped.written >= served {
                state.served.insert(key.clone(), stamped.written);
                return Promise::resolved(stamped.item.clone());
            }
        }

        let deferred = Deferred::new();
        let promise = deferred.promise();
        state.pending.entry(key.clone()).or_default().push(deferred);
        promise
    }

    /// Whether `key` has an item or a reader waiting for one.
    pub fn has(&self, key: &K) -> bool {
        let state = self.state.lock();
        state.items.contains_key(key) || state.pending.contains_key(key)
    }

    /// Drop every item and reject pending readers with [`Error::Cleared`].
    ///
    /// Rejected readers should retry, the rejection is not fatal.
    pub fn clear(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.items.clear();
            std::mem::take(&mut state.pending)
        };

        for (key, waiters) in pending {
            let label = format!("{key:?}");
            for waiter in waiters {
                waiter.reject(Error::Cleared(label.clone()));
            }
        }
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T> Default for KeyedCache<K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
