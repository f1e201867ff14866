//! Mutex-guarded shared cache
//!
//! Every read and write of the underlying map happens inside one critical
//! section per cache instance, so operations are linearizable. The lock is
//! held only for the map access itself; values are cloned out before it is
//! released.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use parking_lot::Mutex;

pub mod counter;

pub use counter::SharedCounter;

/// A process-local, unbounded key/value store shared between tasks.
///
/// Cloning the cache yields another handle to the same instance.
pub struct SharedCache<K = String, V = String> {
    entries: Arc<Mutex<HashMap<K, V>>>,
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert or overwrite the entry for `key`
    pub fn set(&self, key: K, value: V) {
        self.entries.lock().insert(key, value);
    }

    /// Get the current value for `key`, or `None` if it was never set
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().get(key).cloned()
    }

    /// Remove the entry for `key`, returning its last value
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().remove(key)
    }

    /// Check whether `key` is present
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().contains_key(key)
    }

    /// Read-modify-write `key` inside a single critical section.
    ///
    /// `f` receives the current value (if any) and returns the new one, which
    /// is also returned to the caller. `f` runs under the lock and must not
    /// block or touch this cache.
    pub fn update<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let mut entries = self.entries.lock();
        let next = f(entries.get(&key));
        entries.insert(key, next.clone());
        next
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> HashMap<K, V>
    where
        K: Clone,
    {
        self.entries.lock().clone()
    }
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> Default for SharedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for SharedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("len", &self.entries.lock().len())
            .finish()
    }
}
