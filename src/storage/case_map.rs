//! Case-insensitive map keyed by lower-cased names.
//!
//! Keys are normalised with `to_lowercase` on every access. The original
//! spelling is not kept in the key; values that need it store it themselves.

use indexmap::IndexMap;
use indexmap::map::Entry;

#[derive(Debug, Clone)]
pub struct CaseInsensitiveMap<V> {
    inner: IndexMap<String, V>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self {
            inner: IndexMap::new(),
        }
    }
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(key: &str) -> String {
        key.to_lowercase()
    }

    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        self.inner.insert(Self::normalize(key), value)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.inner.get(&Self::normalize(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.inner.get_mut(&Self::normalize(key))
    }

    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> V) -> &mut V {
        match self.inner.entry(Self::normalize(key)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Remove preserving the insertion order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.inner.shift_remove(&Self::normalize(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(&Self::normalize(key))
    }

    /// Normalised keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &mut V) -> bool) {
        self.inner.retain(|k, v| keep(k, v));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("AccountService", 1);

        assert_eq!(map.get("accountservice"), Some(&1));
        assert_eq!(map.get("ACCOUNTSERVICE"), Some(&1));
        assert!(map.contains_key("AccountSERVICE"));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["accountservice"]);
    }

    #[test]
    fn test_insert_with_other_case_overwrites() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("Foo", "first");
        let previous = map.insert("FOO", "second");

        assert_eq!(previous, Some("first"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("foo"), Some(&"second"));
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut map: CaseInsensitiveMap<Vec<u32>> = CaseInsensitiveMap::new();
        map.get_or_insert_with("Bar", Vec::new).push(1);
        map.get_or_insert_with("bar", Vec::new).push(2);

        assert_eq!(map.get("BAR"), Some(&vec![1, 2]));
        assert_eq!(map.remove("bAr"), Some(vec![1, 2]));
        assert!(map.is_empty());
    }
}
