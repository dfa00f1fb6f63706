//! Per-packet feature snapshot
//!
//! Fixed 17-column schema matching the CICIDS2017 training layout. Column
//! order is canonical: the scaler, the anomaly forest and the classifier were
//! all fitted against it, so it must never change without retraining.

use serde::{Deserialize, Serialize};

use crate::core::TcpFlags;

/// Number of columns in the canonical schema
pub const NUM_FEATURES: usize = 17;

/// Canonical column names, in projection order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "Destination Port",
    "Flow Duration",
    "Total Fwd Packets",
    "Total Backward Packets",
    "Total Length of Fwd Packets",
    "Total Length of Bwd Packets",
    "Fwd Packet Length Mean",
    "Bwd Packet Length Mean",
    "Flow Packets/s",
    "FIN Flag Count",
    "SYN Flag Count",
    "RST Flag Count",
    "PSH Flag Count",
    "ACK Flag Count",
    "URG Flag Count",
    "CWE Flag Count",
    "ECE Flag Count",
];

/// Immutable per-packet snapshot of the owning flow's aggregates
///
/// Produced once by the flow tracker, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Destination port (0 for non-TCP packets)
    pub dst_port: u16,
    /// Flow duration in microseconds, floored at 1
    pub duration_us: u64,
    /// Packets seen in the forward direction
    pub fwd_packets: u64,
    /// Packets seen in the backward direction
    pub bwd_packets: u64,
    /// Bytes seen in the forward direction
    pub fwd_bytes: u64,
    /// Bytes seen in the backward direction
    pub bwd_bytes: u64,
    /// Mean packet length, forward
    pub fwd_len_mean: f32,
    /// Mean packet length, backward
    pub bwd_len_mean: f32,
    /// Total packets over elapsed seconds (epsilon-floored)
    pub packets_per_sec: f32,
    /// This packet's TCP flags (all-zero for non-TCP)
    pub flags: TcpFlags,
}

impl FeatureVector {
    /// Project onto the canonical 17-column row
    pub fn to_row(&self) -> [f32; NUM_FEATURES] {
        let f = &self.flags;
        [
            self.dst_port as f32,
            self.duration_us as f32,
            self.fwd_packets as f32,
            self.bwd_packets as f32,
            self.fwd_bytes as f32,
            self.bwd_bytes as f32,
            self.fwd_len_mean,
            self.bwd_len_mean,
            self.packets_per_sec,
            f.fin as u8 as f32,
            f.syn as u8 as f32,
            f.rst as u8 as f32,
            f.psh as u8 as f32,
            f.ack as u8 as f32,
            f.urg as u8 as f32,
            // CICIDS2017 names the CWR bit "CWE Flag Count"
            f.cwr as u8 as f32,
            f.ece as u8 as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_width() {
        assert_eq!(FEATURE_NAMES.len(), NUM_FEATURES);
    }

    #[test]
    fn test_row_projection_order() {
        let fv = FeatureVector {
            dst_port: 443,
            duration_us: 1_000,
            fwd_packets: 3,
            bwd_packets: 2,
            fwd_bytes: 300,
            bwd_bytes: 200,
            fwd_len_mean: 100.0,
            bwd_len_mean: 100.0,
            packets_per_sec: 5000.0,
            flags: TcpFlags { syn: true, ack: true, ..Default::default() },
        };

        let row = fv.to_row();
        assert_eq!(row[0], 443.0);
        assert_eq!(row[1], 1_000.0);
        assert_eq!(row[2], 3.0);
        assert_eq!(row[8], 5000.0);
        // SYN and ACK indicator columns
        assert_eq!(row[10], 1.0);
        assert_eq!(row[13], 1.0);
        // FIN stays zero
        assert_eq!(row[9], 0.0);
    }
}
