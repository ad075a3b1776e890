//! Crawl statistics
//!
//! Append-only counters shared by every in-flight crawl. All updates go
//! through atomic operations so concurrent tasks never lose increments;
//! nothing is ever deleted during the process lifetime. A snapshot feeds the
//! export/display paths so every report sees one consistent state.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::result::ExtractorKind;

/// Per-extractor running totals.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ExtractorStats {
    pub runs: usize,
    pub failures: usize,
    pub total_duration_ms: u64,
}

// A consistent snapshot of the counters, shared by the export paths.
struct StatsSnapshot {
    crawls_started: usize,
    crawls_succeeded: usize,
    crawls_failed: usize,
    cache_hits: usize,
    retries: usize,
    llm_calls: usize,
    llm_failures: usize,
    per_extractor: HashMap<String, ExtractorStats>,
    per_url_ms: HashMap<String, u64>,
    elapsed: Duration,
}

#[derive(Debug)]
pub struct StatsCollector {
    start_time: Instant,

    pub crawls_started: AtomicUsize,
    pub crawls_succeeded: AtomicUsize,
    pub crawls_failed: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub retries: AtomicUsize,
    pub llm_calls: AtomicUsize,
    pub llm_failures: AtomicUsize,

    per_extractor: DashMap<ExtractorKind, ExtractorStats>,
    per_url_ms: DashMap<String, u64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            crawls_started: AtomicUsize::new(0),
            crawls_succeeded: AtomicUsize::new(0),
            crawls_failed: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
            llm_calls: AtomicUsize::new(0),
            llm_failures: AtomicUsize::new(0),
            per_extractor: DashMap::new(),
            per_url_ms: DashMap::new(),
        }
    }

    pub fn record_crawl_started(&self) {
        self.crawls_started.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_crawl_finished(&self, url: &str, success: bool, duration: Duration) {
        if success {
            self.crawls_succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.crawls_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.per_url_ms
            .insert(url.to_string(), duration.as_millis() as u64);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    /// Count retries beyond the first attempt of a crawl.
    pub fn record_retries(&self, attempts: u32) {
        if attempts > 1 {
            self.retries
                .fetch_add((attempts - 1) as usize, Ordering::SeqCst);
        }
    }

    pub fn record_extractor(&self, kind: ExtractorKind, success: bool, duration: Duration) {
        let mut entry = self.per_extractor.entry(kind).or_default();
        entry.runs += 1;
        if !success {
            entry.failures += 1;
        }
        entry.total_duration_ms += duration.as_millis() as u64;
    }

    pub fn record_llm(&self, success: bool) {
        self.llm_calls.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.llm_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut per_extractor = HashMap::new();
        for entry in self.per_extractor.iter() {
            per_extractor.insert(entry.key().name().to_string(), entry.value().clone());
        }
        let mut per_url_ms = HashMap::new();
        for entry in self.per_url_ms.iter() {
            per_url_ms.insert(entry.key().clone(), *entry.value());
        }

        StatsSnapshot {
            crawls_started: self.crawls_started.load(Ordering::SeqCst),
            crawls_succeeded: self.crawls_succeeded.load(Ordering::SeqCst),
            crawls_failed: self.crawls_failed.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            llm_calls: self.llm_calls.load(Ordering::SeqCst),
            llm_failures: self.llm_failures.load(Ordering::SeqCst),
            per_extractor,
            per_url_ms,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let snapshot = self.snapshot();
        serde_json::json!({
            "elapsed_ms": snapshot.elapsed.as_millis() as u64,
            "crawls": {
                "started": snapshot.crawls_started,
                "succeeded": snapshot.crawls_succeeded,
                "failed": snapshot.crawls_failed,
                "cache_hits": snapshot.cache_hits,
                "retries": snapshot.retries,
            },
            "llm": {
                "calls": snapshot.llm_calls,
                "failures": snapshot.llm_failures,
            },
            "extractors": snapshot.per_extractor,
            "url_durations_ms": snapshot.per_url_ms,
        })
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {:?}", snapshot.elapsed)?;
        writeln!(
            f,
            "  crawls   : started: {}, ok: {}, fail: {}, cache hits: {}, retries: {}",
            snapshot.crawls_started,
            snapshot.crawls_succeeded,
            snapshot.crawls_failed,
            snapshot.cache_hits,
            snapshot.retries
        )?;
        if snapshot.llm_calls > 0 {
            writeln!(
                f,
                "  llm      : calls: {}, failures: {}",
                snapshot.llm_calls, snapshot.llm_failures
            )?;
        }

        let mut names: Vec<_> = snapshot.per_extractor.keys().collect();
        names.sort();
        for name in names {
            let s = &snapshot.per_extractor[name];
            writeln!(
                f,
                "  {:<9}: runs: {}, failures: {}, total: {}ms",
                name, s.runs, s.failures, s.total_duration_ms
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = StatsCollector::new();
        stats.record_crawl_started();
        stats.record_crawl_started();
        stats.record_crawl_finished("https://a.example", true, Duration::from_millis(120));
        stats.record_crawl_finished("https://b.example", false, Duration::from_millis(80));
        stats.record_cache_hit();
        stats.record_retries(3);
        stats.record_retries(1);

        let json = stats.to_json();
        assert_eq!(json["crawls"]["started"], 2);
        assert_eq!(json["crawls"]["succeeded"], 1);
        assert_eq!(json["crawls"]["failed"], 1);
        assert_eq!(json["crawls"]["cache_hits"], 1);
        assert_eq!(json["crawls"]["retries"], 2);
        assert_eq!(json["url_durations_ms"]["https://a.example"], 120);
    }

    #[test]
    fn extractor_stats_track_failures_and_duration() {
        let stats = StatsCollector::new();
        stats.record_extractor(ExtractorKind::Text, true, Duration::from_millis(10));
        stats.record_extractor(ExtractorKind::Text, false, Duration::from_millis(5));
        stats.record_extractor(ExtractorKind::Links, true, Duration::from_millis(7));

        let json = stats.to_json();
        assert_eq!(json["extractors"]["text"]["runs"], 2);
        assert_eq!(json["extractors"]["text"]["failures"], 1);
        assert_eq!(json["extractors"]["text"]["total_duration_ms"], 15);
        assert_eq!(json["extractors"]["links"]["runs"], 1);
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_increments() {
        let stats = std::sync::Arc::new(StatsCollector::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    stats.record_crawl_started();
                    stats.record_extractor(
                        ExtractorKind::Images,
                        true,
                        Duration::from_millis(1),
                    );
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(stats.crawls_started.load(Ordering::SeqCst), 800);
        let json = stats.to_json();
        assert_eq!(json["extractors"]["images"]["runs"], 800);
    }
}
