//! Size/time-adaptive batching
//!
//! Buffers feature vectors with their packet metadata and drains them when the
//! buffer is full or has aged past the configured limit. Flushing is
//! synchronous: the caller hands the drained batch straight to the detection
//! engine before the next packet is accepted, so the buffer never holds more
//! than `max_size` items.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{IpProtocol, TcpFlags};
use crate::flow::FeatureVector;

fn default_max_size() -> usize {
    10
}

fn default_max_age_secs() -> f64 {
    1.0
}

/// Accumulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Flush once this many items are buffered
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Flush once the buffer is older than this many seconds
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl BatchConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs_f64(self.max_age_secs)
    }
}

/// A feature vector plus the packet metadata needed downstream
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub features: FeatureVector,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub protocol: IpProtocol,
    pub length: u32,
    pub flags: TcpFlags,
    pub timestamp: DateTime<Utc>,
}

/// An ordered batch of pending items
///
/// Order is significant end-to-end: decision `i` always refers to item `i`.
pub type Batch = Vec<PendingItem>;

/// Size/time-triggered batch buffer
pub struct BatchAccumulator {
    config: BatchConfig,
    buffer: Vec<PendingItem>,
    last_flush: Instant,
}

impl BatchAccumulator {
    pub fn new(config: BatchConfig) -> Self {
        let capacity = config.max_size;
        Self {
            config,
            buffer: Vec::with_capacity(capacity),
            last_flush: Instant::now(),
        }
    }

    /// Append an item, draining the buffer if a flush condition holds
    ///
    /// At most one flush per call. The returned batch is never empty.
    pub fn add(&mut self, item: PendingItem) -> Option<Batch> {
        self.buffer.push(item);

        let size_due = self.buffer.len() >= self.config.max_size;
        let age_due = self.last_flush.elapsed() > self.config.max_age();

        if size_due || age_due {
            self.drain()
        } else {
            None
        }
    }

    /// Drain whatever is buffered, regardless of thresholds
    ///
    /// Used at shutdown so trailing packets still get scored.
    pub fn force_flush(&mut self) -> Option<Batch> {
        self.drain()
    }

    fn drain(&mut self) -> Option<Batch> {
        self.last_flush = Instant::now();
        if self.buffer.is_empty() {
            return None;
        }

        let capacity = self.config.max_size;
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(capacity));
        debug!("Flushing batch of {} items", batch.len());
        Some(batch)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
