//! Key/Value Cache
//!
//! A small string-keyed store shared by scopes (seeds and computed values) and
//! graphs (given bindings). Entries are kept in insertion order.

use indexmap::IndexMap;
use parking_lot::RwLock;

/// A string-keyed store with insert-only-if-absent support.
///
/// Presence is tracked independently of the stored value, so a
/// `Cache<Option<T>>` can hold `None` and still report the key as present.
#[derive(Debug)]
pub struct Cache<T> {
    entries: RwLock<IndexMap<String, T>>,
}

impl<T: Clone> Cache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Get a clone of the entry for `key`.
    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Store `value`, replacing any previous entry. Returns the old entry.
    pub fn put(&self, key: impl Into<String>, value: T) -> Option<T> {
        self.entries.write().insert(key.into(), value)
    }

    /// Store `value` only if `key` is absent.
    ///
    /// Returns `true` when the value was inserted.
    pub fn put_if_absent(&self, key: impl Into<String>, value: T) -> bool {
        let mut entries = self.entries.write();
        match entries.entry(key.into()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl<T: Clone> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}
