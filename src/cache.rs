//! Crawl result cache
//!
//! Keyed by a fingerprint over (normalized URL, serialized extraction
//! config): the same URL crawled with a different extraction intent is a
//! different cache entry. Eviction is lazy; an expired entry is treated as a
//! miss on its next lookup and removed there. Concurrent lookups do not block
//! each other (sharded map), and concurrent stores to the same fingerprint
//! are last-write-wins with no partial entry ever visible.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use crate::config::ExtractionConfig;
use crate::result::CrawlResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: CrawlResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

#[derive(Debug)]
pub struct CacheManager {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl CacheManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Deterministic fingerprint over the normalized URL and the canonical
    /// JSON form of the extraction config. Identical inputs always produce
    /// the identical fingerprint; either input changing changes it.
    pub fn fingerprint(url: &str, config: &ExtractionConfig) -> String {
        let normalized = normalize_url(url);
        // serde_json emits struct fields in declaration order, which makes
        // the serialization canonical for our config type.
        let config_json = serde_json::to_string(config).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0u8]);
        hasher.update(config_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns the cached result if a live entry exists. Removes the entry
    /// and reports a miss when it has outlived its TTL.
    pub fn lookup(&self, fingerprint: &str) -> Option<CrawlResult> {
        let hit = match self.entries.get(fingerprint) {
            Some(entry) if !entry.expired() => Some(entry.result.clone()),
            Some(_) => None,
            None => return None,
        };
        if hit.is_none() {
            self.entries.remove(fingerprint);
        }
        hit
    }

    pub fn store(&self, fingerprint: String, result: CrawlResult) {
        self.entries.insert(
            fingerprint,
            CacheEntry {
                result,
                created_at: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Called opportunistically; correctness never
    /// depends on it since lookup re-checks the TTL.
    pub fn purge_expired(&self) {
        self.entries.retain(|_, entry| !entry.expired());
    }
}

/// Canonical URL form used for fingerprinting: parsed and re-serialized by
/// the url crate (lowercases scheme/host, resolves default ports), with any
/// fragment dropped. Unparseable input falls back to the raw string so the
/// fingerprint stays deterministic either way.
fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(url: &str) -> CrawlResult {
        CrawlResult::failure(url, "placeholder".into(), 1)
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let config = ExtractionConfig::default();
        let a = CacheManager::fingerprint("https://example.com/page", &config);
        let b = CacheManager::fingerprint("https://example.com/page", &config);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_per_url_and_config() {
        let config = ExtractionConfig::default();
        let base = CacheManager::fingerprint("https://example.com/a", &config);
        assert_ne!(
            base,
            CacheManager::fingerprint("https://example.com/b", &config)
        );

        let other = ExtractionConfig {
            extract_links: true,
            ..Default::default()
        };
        assert_ne!(
            base,
            CacheManager::fingerprint("https://example.com/a", &other)
        );
    }

    #[test]
    fn fingerprint_ignores_host_case_and_fragment() {
        let config = ExtractionConfig::default();
        assert_eq!(
            CacheManager::fingerprint("https://Example.COM/page#top", &config),
            CacheManager::fingerprint("https://example.com/page", &config)
        );
    }

    #[test]
    fn lookup_after_store_round_trips() {
        let cache = CacheManager::new(Duration::from_secs(60));
        let fp = "abc".to_string();
        cache.store(fp.clone(), sample_result("https://example.com"));

        let hit = cache.lookup(&fp).expect("expected a cache hit");
        assert_eq!(hit.url, "https://example.com");
    }

    #[test]
    fn expired_entry_is_a_miss_and_gets_removed() {
        let cache = CacheManager::new(Duration::from_millis(0));
        cache.store("k".into(), sample_result("https://example.com"));

        assert!(cache.lookup("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn store_is_last_write_wins() {
        let cache = CacheManager::new(Duration::from_secs(60));
        cache.store("k".into(), sample_result("https://first.example"));
        cache.store("k".into(), sample_result("https://second.example"));

        assert_eq!(cache.lookup("k").unwrap().url, "https://second.example");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let cache = CacheManager::new(Duration::from_secs(60));
        cache.store("live".into(), sample_result("https://example.com"));
        cache.entries.insert(
            "dead".into(),
            CacheEntry {
                result: sample_result("https://old.example"),
                created_at: Instant::now() - Duration::from_secs(120),
                ttl: Duration::from_secs(60),
            },
        );

        cache.purge_expired();
        assert!(cache.lookup("live").is_some());
        assert!(cache.lookup("dead").is_none());
    }
}
