//! Read-through cache over the site-wide IP ban list.
//!
//! Every API request checks the ban list, so the list is cached in process.
//! Inserting a ban evicts the snapshot; other processes pick the new ban up
//! once their snapshot is older than the configured TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::store::{BanStore, StoreError};

/// Whether `ip` matches a ban pattern. `*` matches any run of characters.
pub fn ip_matches(pattern: &str, ip: &str) -> bool {
    let pattern = pattern.trim();
    if !pattern.contains('*') {
        return pattern == ip;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return false;
    };

    let Some(mut rest) = ip.strip_prefix(*first) else {
        return false;
    };

    for part in &parts[1..parts.len() - 1] {
        match rest.find(*part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(*last)
}

struct Snapshot {
    patterns: Arc<Vec<String>>,
    loaded_at: Instant,
}

pub struct BanListCache {
    store: Arc<dyn BanStore>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl BanListCache {
    pub fn new(store: Arc<dyn BanStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    /// Current ban patterns, loaded from the store when the snapshot is
    /// missing or stale.
    pub async fn patterns(&self) -> Result<Arc<Vec<String>>, StoreError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            if snapshot.loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&snapshot.patterns));
            }
        }

        let patterns = Arc::new(self.store.ip_patterns().await?);
        *self.snapshot.write().await = Some(Snapshot {
            patterns: Arc::clone(&patterns),
            loaded_at: Instant::now(),
        });

        Ok(patterns)
    }

    pub async fn is_banned(&self, ip: &str) -> Result<bool, StoreError> {
        let patterns = self.patterns().await?;

        Ok(patterns.iter().any(|pattern| ip_matches(pattern, ip)))
    }

    /// Persist a ban and drop the cached snapshot.
    pub async fn ban(&self, ip: &str, reason: &str) -> Result<(), StoreError> {
        self.store.insert_ip_ban(ip, reason).await?;
        self.evict().await;

        Ok(())
    }

    pub async fn evict(&self) {
        *self.snapshot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBanStore;

    #[test]
    fn exact_patterns_match_only_themselves() {
        assert!(ip_matches("192.0.2.1", "192.0.2.1"));
        assert!(!ip_matches("192.0.2.1", "192.0.2.10"));
    }

    #[test]
    fn wildcards_match_runs_of_characters() {
        assert!(ip_matches("10.0.*", "10.0.3.4"));
        assert!(ip_matches("*.4", "10.0.3.4"));
        assert!(ip_matches("10.*.3.*", "10.200.3.9"));
        assert!(!ip_matches("10.0.*", "10.1.0.1"));
        assert!(!ip_matches("10.*.3.*", "10.200.4.9"));
    }

    #[tokio::test]
    async fn snapshot_is_reused_until_evicted() {
        let store = Arc::new(MemoryBanStore::new());
        let cache = BanListCache::new(store.clone(), Duration::from_secs(3600));

        assert!(!cache.is_banned("203.0.113.5").await.unwrap());

        // Written behind the cache's back: invisible until eviction.
        store.insert_ip_ban("203.0.113.5", "manual").await.unwrap();
        assert!(!cache.is_banned("203.0.113.5").await.unwrap());

        cache.evict().await;
        assert!(cache.is_banned("203.0.113.5").await.unwrap());
    }

    #[tokio::test]
    async fn ban_through_cache_is_visible_immediately() {
        let store = Arc::new(MemoryBanStore::new());
        let cache = BanListCache::new(store.clone(), Duration::from_secs(3600));

        assert!(!cache.is_banned("198.51.100.1").await.unwrap());
        cache.ban("198.51.100.1", "test").await.unwrap();

        assert!(cache.is_banned("198.51.100.1").await.unwrap());
        assert_eq!(store.bans().await.len(), 1);
    }

    #[tokio::test]
    async fn zero_ttl_always_reloads() {
        let store = Arc::new(MemoryBanStore::new());
        let cache = BanListCache::new(store.clone(), Duration::ZERO);

        assert!(!cache.is_banned("198.51.100.2").await.unwrap());
        store.insert_ip_ban("198.51.100.2", "manual").await.unwrap();

        assert!(cache.is_banned("198.51.100.2").await.unwrap());
    }
}
