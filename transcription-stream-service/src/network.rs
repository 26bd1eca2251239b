use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::config::AudioChunkConfig;
use crate::latency::LatencyStats;

/// Observed network-condition classification.
///
/// Mirrors the effective-connection-type tiers reported by browsers and
/// mobile stacks; `Unknown` covers hosts where no signal is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkCondition {
    #[serde(rename = "4g")]
    FourG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "slow-2g")]
    Slow2g,
    Unknown,
}

/// Maps the latest observed network condition to a chunk-duration tier.
///
/// Stable connections get small chunks for low preview latency; degraded
/// connections get larger chunks so each send amortizes more payload.
pub struct NetworkQualityEstimator {
    config: AudioChunkConfig,
    condition: NetworkCondition,
    change_tx: watch::Sender<NetworkCondition>,
}

impl NetworkQualityEstimator {
    pub fn new(config: AudioChunkConfig) -> Self {
        let (change_tx, _) = watch::channel(NetworkCondition::Unknown);
        Self {
            config,
            condition: NetworkCondition::Unknown,
            change_tx,
        }
    }

    /// Feed a fresh observation. The change channel fires at most once per
    /// actual condition transition.
    pub fn observe(&mut self, condition: NetworkCondition) {
        if condition == self.condition {
            return;
        }
        debug!(
            from = ?self.condition,
            to = ?condition,
            chunk_ms = self.chunk_size_for(condition),
            "network condition changed"
        );
        self.condition = condition;
        let _ = self.change_tx.send(condition);
    }

    /// Return to the no-signal state for a fresh session. Subscribers see
    /// it as an ordinary condition transition.
    pub fn reset(&mut self) {
        self.observe(NetworkCondition::Unknown);
    }

    /// Edge-triggered condition-change notifications.
    pub fn subscribe(&self) -> watch::Receiver<NetworkCondition> {
        self.change_tx.subscribe()
    }

    pub fn condition(&self) -> NetworkCondition {
        self.condition
    }

    /// Chunk duration for the latest observed condition. Pure function of
    /// that observation.
    pub fn current_chunk_size_ms(&self) -> u32 {
        self.chunk_size_for(self.condition)
    }

    fn chunk_size_for(&self, condition: NetworkCondition) -> u32 {
        match condition {
            NetworkCondition::FourG => self.config.stable_ms,
            NetworkCondition::ThreeG => self.config.moderate_ms,
            NetworkCondition::TwoG | NetworkCondition::Slow2g => self.config.poor_ms,
            NetworkCondition::Unknown => self.config.default_ms,
        }
    }

    /// Derive a condition from observed stream latency percentiles.
    ///
    /// Servers have no ambient connection-type signal, so once transcript
    /// traffic is flowing the inter-arrival p95 stands in for it.
    pub fn condition_from_latency(stats: &LatencyStats) -> NetworkCondition {
        match stats.p95 {
            0..=300 => NetworkCondition::FourG,
            301..=800 => NetworkCondition::ThreeG,
            801..=2000 => NetworkCondition::TwoG,
            _ => NetworkCondition::Slow2g,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> NetworkQualityEstimator {
        NetworkQualityEstimator::new(AudioChunkConfig::default())
    }

    #[test]
    fn defaults_to_default_tier_without_signal() {
        let est = estimator();
        assert_eq!(est.condition(), NetworkCondition::Unknown);
        assert_eq!(est.current_chunk_size_ms(), 500);
    }

    #[test]
    fn tiers_map_to_chunk_durations() {
        let mut est = estimator();
        est.observe(NetworkCondition::FourG);
        assert_eq!(est.current_chunk_size_ms(), 250);
        est.observe(NetworkCondition::ThreeG);
        assert_eq!(est.current_chunk_size_ms(), 500);
        est.observe(NetworkCondition::Slow2g);
        assert_eq!(est.current_chunk_size_ms(), 1000);
    }

    #[test]
    fn change_notification_is_edge_triggered() {
        let mut est = estimator();
        let mut rx = est.subscribe();
        assert!(!rx.has_changed().unwrap());

        est.observe(NetworkCondition::FourG);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), NetworkCondition::FourG);

        // Same condition again: no notification.
        est.observe(NetworkCondition::FourG);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn reset_returns_to_unknown_and_notifies() {
        let mut est = estimator();
        est.observe(NetworkCondition::TwoG);
        let mut rx = est.subscribe();

        est.reset();
        assert_eq!(est.condition(), NetworkCondition::Unknown);
        assert_eq!(est.current_chunk_size_ms(), 500);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), NetworkCondition::Unknown);

        // Resetting an already fresh estimator is silent.
        est.reset();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn latency_percentiles_classify_condition() {
        let stats = |p95| LatencyStats {
            p50: p95 / 2,
            p95,
            p99: p95,
            avg: p95 as f64,
            total: 10,
        };
        assert_eq!(
            NetworkQualityEstimator::condition_from_latency(&stats(120)),
            NetworkCondition::FourG
        );
        assert_eq!(
            NetworkQualityEstimator::condition_from_latency(&stats(600)),
            NetworkCondition::ThreeG
        );
        assert_eq!(
            NetworkQualityEstimator::condition_from_latency(&stats(5_000)),
            NetworkCondition::Slow2g
        );
    }
}
