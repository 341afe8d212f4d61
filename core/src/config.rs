// Relay configuration — tunable timings and budgets
//
// The qualitative guarantees (exactly-once completions, monotonic backoff,
// monotonic quality classification) hold for any values here; these
// defaults are the recorded product choices.

use crate::session::health::QualityThresholds;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for a relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Retry budget per queued message (attempts = 1 + max_retries)
    pub max_retries: u32,
    /// First retry delay; doubles per subsequent retry
    pub retry_base_delay: Duration,
    /// Hard age ceiling for any message, independent of retries
    pub message_timeout: Duration,
    /// Messages dispatched per drain pass
    pub drain_batch: usize,
    /// How often the queue is offered a drain opportunity
    pub drain_tick: Duration,
    /// How often queued and in-flight messages are checked for timeout
    pub sweep_interval: Duration,
    /// Health probe cadence while connected
    pub health_interval: Duration,
    /// Rolling latency window size
    pub latency_window: usize,
    /// Latency bands for quality classification
    pub quality_thresholds: QualityThresholds,
    /// Reconnection backoff floor
    pub reconnect_floor: Duration,
    /// Reconnection backoff ceiling
    pub reconnect_ceiling: Duration,
    /// Outbound queue capacity; enqueue fails beyond this
    pub queue_capacity: usize,
    /// Queue a credits query and language sync on every connect
    pub resync_on_connect: bool,
    /// Language pair assumed until a sync happens
    pub default_source_language: String,
    pub default_target_language: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            message_timeout: Duration::from_secs(30),
            drain_batch: 5,
            drain_tick: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(1),
            health_interval: Duration::from_secs(15),
            latency_window: 10,
            quality_thresholds: QualityThresholds::default(),
            reconnect_floor: Duration::from_secs(1),
            reconnect_ceiling: Duration::from_secs(60),
            queue_capacity: 100,
            resync_on_connect: true,
            default_source_language: "en".to_string(),
            default_target_language: "es".to_string(),
        }
    }
}

impl RelayConfig {
    /// A configuration with tight timings for tests and demos
    pub fn fast() -> Self {
        Self {
            retry_base_delay: Duration::from_millis(50),
            message_timeout: Duration::from_secs(3),
            drain_tick: Duration::from_millis(20),
            sweep_interval: Duration::from_millis(100),
            health_interval: Duration::from_millis(200),
            reconnect_floor: Duration::from_millis(50),
            reconnect_ceiling: Duration::from_secs(2),
            ..Self::default()
        }
    }
}
