//! Flow tracking and feature extraction
//!
//! One bidirectional flow per unordered endpoint pair; one feature vector per
//! packet.

pub mod features;
pub mod tracker;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use features::{FeatureVector, FEATURE_NAMES, NUM_FEATURES};
pub use tracker::{FlowKey, FlowState, FlowTracker};

fn default_max_flows() -> usize {
    100_000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

/// Flow tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Maximum tracked flows; the least-recently-seen flow is evicted beyond this
    #[serde(default = "default_max_flows")]
    pub max_flows: usize,
    /// Flows idle longer than this are swept
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// How often the idle sweep runs
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_flows: default_max_flows(),
            idle_timeout_secs: default_idle_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl FlowConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Tracker statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    pub packets_processed: u64,
    pub bytes_processed: u64,
    pub flows_created: u64,
    pub flows_evicted: u64,
    pub flows_expired: u64,
    pub non_ip_dropped: u64,
}
