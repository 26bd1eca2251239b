use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of samples kept in the sliding window.
pub const LATENCY_WINDOW: usize = 100;

/// Rolling latency statistics over the current window.
///
/// Percentiles are computed by sorting the window and indexing at
/// `floor(n * percentile)`, which is close enough for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyStats {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub avg: f64,
    /// Total samples recorded since the last reset, including ones already
    /// evicted from the window.
    pub total: u64,
}

/// Measures elapsed time between consecutive finalized transcript arrivals
/// as a proxy for end-to-end responsiveness.
///
/// Samples live in a bounded ring of [`LATENCY_WINDOW`] entries; the oldest
/// is evicted on overflow.
#[derive(Debug, Default)]
pub struct LatencyMonitor {
    samples: VecDeque<u64>,
    last_arrival_ms: Option<u64>,
    total: u64,
}

impl LatencyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrival at `now_ms` and return the inter-arrival latency.
    ///
    /// The first arrival only establishes the baseline and produces no
    /// sample.
    pub fn record(&mut self, now_ms: u64) -> Option<u64> {
        let latency = match self.last_arrival_ms {
            Some(prev) => Some(now_ms.saturating_sub(prev)),
            None => None,
        };
        self.last_arrival_ms = Some(now_ms);

        if let Some(latency) = latency {
            if self.samples.len() == LATENCY_WINDOW {
                self.samples.pop_front();
            }
            self.samples.push_back(latency);
            self.total += 1;
        }
        latency
    }

    /// Rolling statistics, or `None` if no samples have been recorded.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        Some(LatencyStats {
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            avg,
            total: self.total,
        })
    }

    /// Clear the window, the baseline, and the counter.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_arrival_ms = None;
        self.total = 0;
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
