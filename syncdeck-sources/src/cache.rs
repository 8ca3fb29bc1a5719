//! TTL response cache.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use syncdeck_types::{CacheConfig, Params};
use tokio::time::Instant;

/// Cache key: the source id, plus the canonical params when the source
/// varies its cache by params.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source_id: String,
    params: Option<String>,
}

impl CacheKey {
    pub fn new(source_id: &str, config: &CacheConfig, params: &Params) -> Self {
        let params = config
            .vary_by_params
            .then(|| serde_json::to_string(params).unwrap_or_default());
        Self {
            source_id: source_id.to_string(),
            params,
        }
    }

}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.params {
            Some(params) => write!(f, "{}?{}", self.source_id, params),
            None => f.write_str(&self.source_id),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    data: Value,
    /// `None` when the TTL reaches past the clock's range.
    expiry: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.expiry.map_or(true, |expiry| Instant::now() < expiry)
    }
}

/// Response cache with lazy expiry.
///
/// An entry is served only while `now < expiry`; expired entries are
/// dropped on the read that finds them.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live() => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CacheKey, data: Value, ttl: Duration) {
        let expiry = Instant::now().checked_add(ttl);
        self.entries.lock().insert(key, CacheEntry { data, expiry });
    }

    /// Drop every entry of one source, or the whole cache.
    pub fn invalidate(&self, source_id: Option<&str>) {
        let mut entries = self.entries.lock();
        match source_id {
            Some(id) => entries.retain(|key, _| key.source_id != id),
            None => entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[cfg(feature = "inspect")]
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().map(|k| k.to_string()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn per_source() -> CacheConfig {
        CacheConfig::ttl(Duration::from_secs(10))
    }

    fn per_params() -> CacheConfig {
        CacheConfig {
            vary_by_params: true,
            ..per_source()
        }
    }

    fn params(page: u64) -> Params {
        let mut params = Params::new();
        params.insert("page".into(), json!(page));
        params
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = ResponseCache::new();
        let key = CacheKey::new("kpis", &per_source(), &Params::new());

        cache.insert(key.clone(), json!({"mrr": 1}), Duration::from_secs(10));
        assert_eq!(cache.get(&key), Some(json!({"mrr": 1})));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get(&key).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty(), "expired entry is evicted on read");
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_ttl_never_expires() {
        let cache = ResponseCache::new();
        let key = CacheKey::new("kpis", &per_source(), &Params::new());

        cache.insert(key.clone(), json!(1), Duration::from_secs(u64::MAX));
        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(cache.get(&key), Some(json!(1)));
    }

    #[test]
    fn per_source_key_ignores_params() {
        let a = CacheKey::new("kpis", &per_source(), &params(1));
        let b = CacheKey::new("kpis", &per_source(), &params(2));
        assert_eq!(a, b);
    }

    #[test]
    fn per_params_key_distinguishes_params() {
        let a = CacheKey::new("kpis", &per_params(), &params(1));
        let b = CacheKey::new("kpis", &per_params(), &params(2));
        assert_ne!(a, b);
        assert_eq!(a.to_string(), r#"kpis?{"page":1}"#);
    }

    #[tokio::test]
    async fn invalidate_one_source_keeps_others() {
        let cache = ResponseCache::new();
        let ttl = Duration::from_secs(60);
        cache.insert(CacheKey::new("a", &per_params(), &params(1)), json!(1), ttl);
        cache.insert(CacheKey::new("a", &per_params(), &params(2)), json!(2), ttl);
        cache.insert(CacheKey::new("b", &per_source(), &Params::new()), json!(3), ttl);

        cache.invalidate(Some("a"));
        assert_eq!(cache.len(), 1);

        cache.invalidate(None);
        assert!(cache.is_empty());
    }
}
