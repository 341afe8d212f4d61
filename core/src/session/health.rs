//! Health checks — round-trip probes and link-quality classification
//!
//! A lightweight probe is round-tripped on a fixed interval while the peer
//! is connected. Round-trip times land in a bounded rolling window and the
//! window mean maps onto an ordinal quality tier. A probe that never comes
//! back contributes no fabricated sample; it is a liveness signal handled
//! by the session manager.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Ordinal link quality derived from the rolling latency window
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ConnectionQuality {
    /// No samples yet
    Unknown,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionQuality::Unknown => write!(f, "unknown"),
            ConnectionQuality::Poor => write!(f, "poor"),
            ConnectionQuality::Fair => write!(f, "fair"),
            ConnectionQuality::Good => write!(f, "good"),
            ConnectionQuality::Excellent => write!(f, "excellent"),
        }
    }
}

/// Latency bands separating the quality tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Mean RTT below this is excellent
    pub excellent: Duration,
    /// Mean RTT below this is good
    pub good: Duration,
    /// Mean RTT below this is fair; anything above is poor
    pub fair: Duration,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: Duration::from_millis(150),
            good: Duration::from_millis(400),
            fair: Duration::from_millis(1000),
        }
    }
}

impl QualityThresholds {
    /// Map a mean round-trip time onto a quality tier
    pub fn classify(&self, mean_rtt: Duration) -> ConnectionQuality {
        if mean_rtt < self.excellent {
            ConnectionQuality::Excellent
        } else if mean_rtt < self.good {
            ConnectionQuality::Good
        } else if mean_rtt < self.fair {
            ConnectionQuality::Fair
        } else {
            ConnectionQuality::Poor
        }
    }
}

/// Fixed-capacity rolling window of round-trip times, oldest evicted
#[derive(Debug)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record a sample, evicting the oldest when the window is full
    pub fn push(&mut self, rtt: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt);
    }

    /// Arithmetic mean of the current window
    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// The probe currently in flight
#[derive(Debug, Clone)]
struct OutstandingProbe {
    id: String,
}

/// Tracks probe round trips and derives the current quality tier
pub struct HealthTracker {
    window: LatencyWindow,
    thresholds: QualityThresholds,
    outstanding: Option<OutstandingProbe>,
}

impl HealthTracker {
    pub fn new(window_size: usize, thresholds: QualityThresholds) -> Self {
        Self {
            window: LatencyWindow::new(window_size),
            thresholds,
            outstanding: None,
        }
    }

    /// Note a new probe going out. Returns true when the previous probe was
    /// still unanswered — a liveness signal for the caller.
    pub fn begin_probe(&mut self, id: impl Into<String>) -> bool {
        let missed = self.outstanding.is_some();
        if missed {
            debug!("health probe went unanswered");
        }
        self.outstanding = Some(OutstandingProbe { id: id.into() });
        missed
    }

    /// Record a probe reply. Returns the sample when the reply matches the
    /// in-flight probe; stale replies are ignored.
    pub fn record_reply(&mut self, id: &str, rtt: Duration) -> Option<Duration> {
        match &self.outstanding {
            Some(probe) if probe.id == id => {
                self.outstanding = None;
                self.window.push(rtt);
                Some(rtt)
            }
            _ => {
                debug!("ignoring stale probe reply {}", id);
                None
            }
        }
    }

    /// Current quality tier from the rolling window mean
    pub fn quality(&self) -> ConnectionQuality {
        match self.window.mean() {
            Some(mean) => self.thresholds.classify(mean),
            None => ConnectionQuality::Unknown,
        }
    }

    /// Forget samples and any in-flight probe, e.g. after a disconnect
    pub fn reset(&mut self) {
        self.window.clear();
        self.outstanding = None;
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker() -> HealthTracker {
        HealthTracker::new(10, QualityThresholds::default())
    }

    #[test]
    fn test_quality_unknown_without_samples() {
        assert_eq!(tracker().quality(), ConnectionQuality::Unknown);
    }

    #[test]
    fn test_quality_tiers() {
        let thresholds = QualityThresholds::default();
        assert_eq!(
            thresholds.classify(Duration::from_millis(40)),
            ConnectionQuality::Excellent
        );
        assert_eq!(
            thresholds.classify(Duration::from_millis(200)),
            ConnectionQuality::Good
        );
        assert_eq!(
            thresholds.classify(Duration::from_millis(700)),
            ConnectionQuality::Fair
        );
        assert_eq!(
            thresholds.classify(Duration::from_millis(2500)),
            ConnectionQuality::Poor
        );
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = LatencyWindow::new(3);
        for ms in [100, 200, 300, 400] {
            window.push(Duration::from_millis(ms));
        }
        assert_eq!(window.len(), 3);
        // Oldest (100ms) evicted: mean of 200/300/400
        assert_eq!(window.mean(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_probe_round_trip() {
        let mut tracker = tracker();
        assert!(!tracker.begin_probe("p1"));

        let sample = tracker.record_reply("p1", Duration::from_millis(80));
        assert_eq!(sample, Some(Duration::from_millis(80)));
        assert_eq!(tracker.quality(), ConnectionQuality::Excellent);
    }

    #[test]
    fn test_stale_reply_ignored() {
        let mut tracker = tracker();
        tracker.begin_probe("p1");
        tracker.record_reply("p1", Duration::from_millis(80)).unwrap();

        // Duplicate delivery of the same reply
        assert!(tracker.record_reply("p1", Duration::from_millis(80)).is_none());
        assert_eq!(tracker.sample_count(), 1);
    }

    #[test]
    fn test_missed_probe_reported_and_window_untouched() {
        let mut tracker = tracker();
        tracker.begin_probe("p1");

        // Next probe goes out while p1 is still unanswered
        assert!(tracker.begin_probe("p2"));
        assert_eq!(tracker.sample_count(), 0);

        // The late p1 reply no longer matches
        assert!(tracker.record_reply("p1", Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut tracker = tracker();
        tracker.begin_probe("p1");
        tracker.record_reply("p1", Duration::from_millis(80));

        tracker.reset();
        assert_eq!(tracker.quality(), ConnectionQuality::Unknown);
        assert!(!tracker.begin_probe("p2"));
    }

    proptest! {
        // Lower mean latency never yields a worse tier than higher latency.
        #[test]
        fn prop_classification_is_monotonic(a_ms in 0u64..5_000, b_ms in 0u64..5_000) {
            let thresholds = QualityThresholds::default();
            let (lo, hi) = if a_ms <= b_ms { (a_ms, b_ms) } else { (b_ms, a_ms) };

            let lo_quality = thresholds.classify(Duration::from_millis(lo));
            let hi_quality = thresholds.classify(Duration::from_millis(hi));
            prop_assert!(lo_quality >= hi_quality);
        }

        // Classification is deterministic.
        #[test]
        fn prop_classification_is_deterministic(ms in 0u64..5_000) {
            let thresholds = QualityThresholds::default();
            let first = thresholds.classify(Duration::from_millis(ms));
            let second = thresholds.classify(Duration::from_millis(ms));
            prop_assert_eq!(first, second);
        }
    }
}
