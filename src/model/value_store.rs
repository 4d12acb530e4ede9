//! Typed-key heterogeneous map carried by `Job` and `JobSource` (spec §9's
//! value-store design note). Keys are `(name, TypeId)` pairs, so retrieving
//! under the wrong type simply misses rather than panicking or needing a
//! runtime type tag check at every call site.

use std::any::{Any, TypeId};
use std::collections::HashMap;

trait StoredValue: Any {
    fn clone_box(&self) -> Box<dyn StoredValue>;
    fn as_any(&self) -> &dyn Any;
}

impl<T> StoredValue for T
where
    T: Any + Clone,
{
    fn clone_box(&self) -> Box<dyn StoredValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Clone for Box<dyn StoredValue> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A typed-key heterogeneous map: `put`/`get` are generic over the stored
/// type, and a key only collides with another `put` of the exact same type.
#[derive(Clone, Default)]
pub struct ValueStore {
    entries: HashMap<(String, TypeId), Box<dyn StoredValue>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Any + Clone>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert((key.into(), TypeId::of::<T>()), Box::new(value));
    }

    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<&T> {
        self.entries
            .get(&(key.to_owned(), TypeId::of::<T>()))
            .and_then(|v| v.as_any().downcast_ref::<T>())
    }

    pub fn remove<T: Any + Clone>(&mut self, key: &str) -> Option<T> {
        self.entries
            .remove(&(key.to_owned(), TypeId::of::<T>()))
            .and_then(|v| v.as_any().downcast_ref::<T>().cloned())
    }

    /// Names of every key currently stored, regardless of value type.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|(k, _)| k.as_str()).collect()
    }
}

impl std::fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStore")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_roundtrip() {
        let mut store = ValueStore::new();
        store.put("priority", 3i32);
        store.put("label", "hot".to_string());

        assert_eq!(store.get::<i32>("priority"), Some(&3));
        assert_eq!(store.get::<String>("label"), Some(&"hot".to_string()));
        // wrong type under the same name misses, doesn't panic
        assert_eq!(store.get::<String>("priority"), None);

        assert_eq!(store.remove::<i32>("priority"), Some(3));
        assert_eq!(store.get::<i32>("priority"), None);
    }

    #[test]
    fn keys_lists_every_stored_name() {
        let mut store = ValueStore::new();
        store.put("a", 1i32);
        store.put("b", "x".to_string());
        let mut keys = store.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
