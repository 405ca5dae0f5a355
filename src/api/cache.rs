use crate::types::StatsResponse;
use moka::sync::Cache;
use std::time::Duration;

/// Short-lived cache of stats responses keyed on window hours.
/// A zero TTL disables caching.
pub struct StatsCache {
    inner: Option<Cache<u64, StatsResponse>>,
}

impl StatsCache {
    pub fn new(ttl_secs: u64) -> Self {
        let inner = (ttl_secs > 0).then(|| {
            Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(64)
                .build()
        });
        Self { inner }
    }

    pub fn get(&self, hours: u64) -> Option<StatsResponse> {
        self.inner.as_ref()?.get(&hours)
    }

    pub fn insert(&self, hours: u64, value: StatsResponse) {
        if let Some(cache) = &self.inner {
            cache.insert(hours, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hours: u64) -> StatsResponse {
        StatsResponse {
            total_unique_visitors: 3,
            total_visits: 7,
            recent_visitors: 1,
            window_hours: hours,
        }
    }

    #[test]
    fn test_roundtrip_per_window() {
        let cache = StatsCache::new(60);
        cache.insert(24, sample(24));
        assert_eq!(cache.get(24).unwrap().total_visits, 7);
        assert!(cache.get(48).is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = StatsCache::new(0);
        cache.insert(24, sample(24));
        assert!(cache.get(24).is_none());
    }
}
