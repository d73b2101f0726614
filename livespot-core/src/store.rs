//! Injectable keyed state.
//!
//! Components that need per-key mutable state (retry counters, known-viewer
//! sets, profile accumulators, segment snapshots) take an
//! `Arc<dyn KeyedStore<K, V>>` instead of owning a global map. Tests build an
//! isolated [`MemoryStore`] each; a shared backing store can be swapped in later.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

pub trait KeyedStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    fn insert(&self, key: K, value: V) -> Option<V>;

    fn remove(&self, key: &K) -> Option<V>;

    fn contains(&self, key: &K) -> bool;

    /// Applies `f` to the value at `key`, inserting `default` first if absent.
    /// Returns the value after the update.
    fn upsert(&self, key: K, default: V, f: &mut dyn FnMut(&mut V)) -> V;

    /// Keeps only the entries for which `keep` returns true.
    fn retain(&self, keep: &mut dyn FnMut(&K, &V) -> bool);

    fn keys(&self) -> Vec<K>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drops every entry whose string key starts with `prefix`. Returns how many went.
pub fn remove_by_prefix<V>(store: &dyn KeyedStore<String, V>, prefix: &str) -> usize {
    let before = store.len();
    store.retain(&mut |k, _| !k.starts_with(prefix));
    before.saturating_sub(store.len())
}

/// In-process store backed by a `DashMap`.
pub struct MemoryStore<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    pub fn shared() -> Arc<dyn KeyedStore<K, V>> {
        Arc::new(Self::new())
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyedStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|v| v.value().clone())
    }

    fn insert(&self, key: K, value: V) -> Option<V> {
        self.map.insert(key, value)
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, v)| v)
    }

    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn upsert(&self, key: K, default: V, f: &mut dyn FnMut(&mut V)) -> V {
        let mut entry = self.map.entry(key).or_insert(default);
        f(entry.value_mut());
        entry.value().clone()
    }

    fn retain(&self, keep: &mut dyn FnMut(&K, &V) -> bool) {
        self.map.retain(|k, v| keep(k, v));
    }

    fn keys(&self) -> Vec<K> {
        self.map.iter().map(|e| e.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
