//! Lock-guarded key/value store.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

/// A thread-safe cache offering get and set, each protected by a mutex.
///
/// Values are cloned out of the cache, so `V` is typically an `Arc`.
#[derive(Debug)]
pub struct SharedCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for SharedCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value from the cache.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Sets a value, returning the previous one.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.entries.lock().insert(key, value)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Removes a value from the cache.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key)
    }

    /// Gets a value, building and storing it first if absent.
    ///
    /// The lock is held while `init` runs, so concurrent callers racing on the
    /// same missing key build the value exactly once. `init` must not touch
    /// this cache.
    ///
    /// # Errors
    ///
    /// Returns whatever `init` returns; nothing is stored in that case.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.get(&key) {
            return Ok(existing.clone());
        }

        let value = init()?;
        entries.insert(key, value.clone());
        Ok(value)
    }

    /// Gets a value, storing `init()` first if absent.
    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> V,
    {
        self.entries.lock().entry(key).or_insert_with(init).clone()
    }

    /// Returns a snapshot of every value.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.entries.lock().values().cloned().collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
