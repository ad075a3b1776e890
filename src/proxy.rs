//! Proxy pool with health tracking
//!
//! Round-robin selection over healthy endpoints. An endpoint flips to
//! unhealthy after a configured run of consecutive failures and is revived by
//! any success. When the whole pool is unhealthy the manager either
//! soft-resets every record (one recovery cycle) or surfaces
//! `ProxyExhausted`, per configuration.
//!
//! All state sits behind one `parking_lot::Mutex`; the lock is never held
//! across an await point, so concurrent success/failure reports cannot lose
//! updates.

use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{SpiderError, SpiderResult};

#[derive(Debug, Clone)]
pub struct ProxyRecord {
    pub endpoint: String,
    pub failure_count: u32,
    pub last_used_at: Option<Instant>,
    pub healthy: bool,
}

impl ProxyRecord {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            failure_count: 0,
            last_used_at: None,
            healthy: true,
        }
    }
}

#[derive(Debug)]
struct Pool {
    records: Vec<ProxyRecord>,
    cursor: usize,
}

#[derive(Debug)]
pub struct ProxyManager {
    pool: Mutex<Pool>,
    failure_threshold: u32,
    reset_on_exhaustion: bool,
}

impl ProxyManager {
    pub fn new(endpoints: &[String], failure_threshold: u32, reset_on_exhaustion: bool) -> Self {
        let records = endpoints
            .iter()
            .map(|e| ProxyRecord::new(e.clone()))
            .collect();
        Self {
            pool: Mutex::new(Pool { records, cursor: 0 }),
            failure_threshold,
            reset_on_exhaustion,
        }
    }

    /// True when no endpoints are configured at all; crawls then run direct.
    pub fn is_empty(&self) -> bool {
        self.pool.lock().records.is_empty()
    }

    /// Pick the next healthy endpoint, round-robin. Never returns an
    /// unhealthy record while a healthy one exists.
    pub fn select(&self) -> SpiderResult<ProxyRecord> {
        let mut pool = self.pool.lock();
        if pool.records.is_empty() {
            return Err(SpiderError::Config("proxy pool is empty".into()));
        }

        if let Some(record) = next_healthy(&mut pool) {
            return Ok(record);
        }

        if self.reset_on_exhaustion {
            warn!("all proxy endpoints unhealthy, soft-resetting pool");
            for record in &mut pool.records {
                record.healthy = true;
                record.failure_count = 0;
            }
            if let Some(record) = next_healthy(&mut pool) {
                return Ok(record);
            }
        }

        Err(SpiderError::ProxyExhausted)
    }

    /// Record the result of a crawl attempt through `endpoint`. Success
    /// resets the failure run and revives the record; failures accumulate
    /// until the threshold flips it unhealthy.
    pub fn report(&self, endpoint: &str, success: bool) {
        let mut pool = self.pool.lock();
        let Some(record) = pool.records.iter_mut().find(|r| r.endpoint == endpoint) else {
            return;
        };

        if success {
            record.failure_count = 0;
            record.healthy = true;
        } else {
            record.failure_count += 1;
            if record.failure_count >= self.failure_threshold && record.healthy {
                debug!(endpoint, failures = record.failure_count, "marking proxy unhealthy");
                record.healthy = false;
            }
        }
    }

    pub fn healthy_count(&self) -> usize {
        self.pool.lock().records.iter().filter(|r| r.healthy).count()
    }
}

fn next_healthy(pool: &mut Pool) -> Option<ProxyRecord> {
    let len = pool.records.len();
    for offset in 0..len {
        let idx = (pool.cursor + offset) % len;
        if pool.records[idx].healthy {
            pool.cursor = (idx + 1) % len;
            pool.records[idx].last_used_at = Some(Instant::now());
            return Some(pool.records[idx].clone());
        }
    }
    None
}
