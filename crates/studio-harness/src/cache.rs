use std::collections::HashMap;

use parking_lot::Mutex;

/// Bounded cache of resolved host references.
///
/// Host objects can be deleted or reparented at any time, so a cached value
/// is never trusted on its own: every hit is revalidated through the
/// caller's liveness check, and a dead entry is dropped and resolved again.
/// When full, the least recently used entry is evicted.
pub struct InstanceCache<V> {
    inner: Mutex<CacheInner<V>>,
}

struct CacheInner<V> {
    entries: HashMap<String, Entry<V>>,
    capacity: usize,
    tick: u64,
    stale_drops: u64,
}

struct Entry<V> {
    value: V,
    last_used: u64,
}

impl<V: Clone> InstanceCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                capacity: capacity.max(1),
                tick: 0,
                stale_drops: 0,
            }),
        }
    }

    /// Cached value for `key` if it is still alive.
    pub fn get(&self, key: &str, is_alive: impl Fn(&V) -> bool) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.tick += 1;
        let entry = inner.entries.get_mut(key)?;
        if is_alive(&entry.value) {
            entry.last_used = inner.tick;
            return Some(entry.value.clone());
        }
        inner.entries.remove(key);
        inner.stale_drops += 1;
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let key = key.into();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= inner.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }
        let last_used = inner.tick;
        inner.entries.insert(key, Entry { value, last_used });
    }

    /// Revalidated hit, or a fresh resolution that is cached on success.
    pub fn get_or_resolve(
        &self,
        key: &str,
        is_alive: impl Fn(&V) -> bool,
        resolve: impl FnOnce() -> Option<V>,
    ) -> Option<V> {
        if let Some(hit) = self.get(key, is_alive) {
            return Some(hit);
        }
        let value = resolve()?;
        self.insert(key, value.clone());
        Some(value)
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.lock().entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries dropped because they failed revalidation.
    pub fn stale_drops(&self) -> u64 {
        self.inner.lock().stale_drops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn evicts_least_recently_used() {
        let cache = InstanceCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get("a", |_| true), Some(1));
        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b", |_| true), None);
        assert_eq!(cache.get("a", |_| true), Some(1));
        assert_eq!(cache.get("c", |_| true), Some(3));
    }

    #[test]
    fn dead_entries_are_dropped_and_re_resolved() {
        let cache = InstanceCache::new(4);
        cache.insert("Workspace.Script", 7);

        let resolves = Cell::new(0);
        let value = cache.get_or_resolve(
            "Workspace.Script",
            |handle| *handle != 7,
            || {
                resolves.set(resolves.get() + 1);
                Some(8)
            },
        );
        assert_eq!(value, Some(8));
        assert_eq!(resolves.get(), 1);
        assert_eq!(cache.stale_drops(), 1);
        assert_eq!(cache.get("Workspace.Script", |_| true), Some(8));
    }

    #[test]
    fn failed_resolution_is_not_cached() {
        let cache: InstanceCache<u32> = InstanceCache::new(4);
        assert_eq!(cache.get_or_resolve("missing", |_| true, || None), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn reinserting_existing_key_does_not_evict() {
        let cache = InstanceCache::new(1);
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.get("a", |_| true), Some(2));
    }
}
