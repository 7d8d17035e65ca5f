use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Read-mostly key/value cache with a fixed TTL. Expired entries are purged
/// lazily on access, never by a background task.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached value if present and not yet expired. An expired
    /// entry is removed on the spot.
    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        {
            let entries = self.entries.read().expect("cache lock poisoned");
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry exists but is stale.
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V, now: DateTime<Utc>) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn contains(&self, key: &K, now: DateTime<Utc>) -> bool {
        self.get(key, now).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_before_expiry() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::seconds(60));
        let now = Utc::now();
        cache.insert("k".to_string(), 7, now);
        assert_eq!(cache.get(&"k".to_string(), now + Duration::seconds(59)), Some(7));
    }

    #[test]
    fn test_miss_after_expiry() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::seconds(60));
        let now = Utc::now();
        cache.insert("k".to_string(), 7, now);
        assert_eq!(cache.get(&"k".to_string(), now + Duration::seconds(61)), None);
        // Lazy purge removed the entry entirely.
        assert!(cache.is_empty());
    }
}
