//! Statistics tracking for DNS proxy.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Url;
use rustc_hash::FxHashMap;

/// Atomic statistics for tracking proxy performance.
pub struct Stats {
    pub requests: AtomicU64,
    pub resolved: AtomicU64,
    pub failed: AtomicU64,
    /// Cumulative resolution time in microseconds for averaging.
    total_response_time_us: AtomicU64,
    /// Races won, keyed by upstream URL.
    wins: Mutex<FxHashMap<String, u64>>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            wins: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn record_resolved(&self, upstream: &Url, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.resolved.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);

        if let Ok(mut wins) = self.wins.lock() {
            *wins.entry(upstream.as_str().to_owned()).or_default() += 1;
        }
    }

    pub fn record_failed(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let resolved = self.resolved.swap(0, Ordering::Relaxed);
        let failed = self.failed.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        let mut wins: Vec<(String, u64)> = self
            .wins
            .lock()
            .map(|mut w| w.drain().collect())
            .unwrap_or_default();
        wins.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        StatsSnapshot {
            requests,
            resolved,
            failed,
            avg_response_ms,
            wins,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatsSnapshot {
    pub requests: u64,
    pub resolved: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
    /// Win counts per upstream, most wins first.
    pub wins: Vec<(String, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_resets_counters() {
        let stats = Stats::new();
        let a = Url::parse("https://a.example/dns-query").unwrap();
        let b = Url::parse("https://b.example/dns-query").unwrap();

        stats.record_resolved(&a, 10.0);
        stats.record_resolved(&b, 20.0);
        stats.record_resolved(&b, 30.0);
        stats.record_failed(40.0);

        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.requests, 4);
        assert_eq!(snap.resolved, 3);
        assert_eq!(snap.failed, 1);
        assert!((snap.avg_response_ms - 25.0).abs() < 0.01);
        assert_eq!(snap.wins[0], (b.to_string(), 2));
        assert_eq!(snap.wins[1], (a.to_string(), 1));

        let empty = stats.snapshot_and_reset();
        assert_eq!(empty.requests, 0);
        assert_eq!(empty.avg_response_ms, 0.0);
        assert!(empty.wins.is_empty());
    }
}
