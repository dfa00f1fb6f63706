//! Stateful flow aggregation
//!
//! Maintains per-flow counters keyed by the unordered endpoint pair and emits
//! one feature snapshot per observed packet. The flow map is bounded: when it
//! reaches capacity the least-recently-seen flow is evicted, and flows idle
//! past the configured timeout are swept opportunistically.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use tracing::{debug, info};

use crate::core::PacketRecord;
use super::features::FeatureVector;
use super::{FlowConfig, TrackerStats};

/// Flow identity: the unordered endpoint pair
///
/// Normalized so the smaller address always sorts first, which makes
/// `FlowKey::new(a, b) == FlowKey::new(b, a)` hold for any pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    addr_a: IpAddr,
    addr_b: IpAddr,
}

impl FlowKey {
    pub fn new(a: IpAddr, b: IpAddr) -> Self {
        if a <= b {
            Self { addr_a: a, addr_b: b }
        } else {
            Self { addr_a: b, addr_b: a }
        }
    }
}

/// Mutable aggregate state for one flow
///
/// Created on first sight of a key, mutated on every subsequent packet.
/// Owned exclusively by the tracker.
#[derive(Debug, Clone)]
pub struct FlowState {
    /// Sender of the first packet; defines the forward direction
    pub first_endpoint: IpAddr,
    /// Flow start (arrival of the first packet)
    pub start: Instant,
    /// Arrival of the most recent packet
    pub last_seen: Instant,
    pub fwd_packets: u64,
    pub bwd_packets: u64,
    pub fwd_bytes: u64,
    pub bwd_bytes: u64,
}

impl FlowState {
    fn new(pkt: &PacketRecord, src: IpAddr) -> Self {
        Self {
            first_endpoint: src,
            start: pkt.arrival,
            last_seen: pkt.arrival,
            fwd_packets: 0,
            bwd_packets: 0,
            fwd_bytes: 0,
            bwd_bytes: 0,
        }
    }

    pub fn total_packets(&self) -> u64 {
        self.fwd_packets + self.bwd_packets
    }
}

/// Flow aggregation engine
pub struct FlowTracker {
    config: FlowConfig,
    flows: HashMap<FlowKey, FlowState>,
    stats: TrackerStats,
    last_cleanup: Instant,
}

impl FlowTracker {
    pub fn new(config: FlowConfig) -> Self {
        info!(
            "Initializing flow tracker (max_flows={}, idle_timeout={}s)",
            config.max_flows, config.idle_timeout_secs
        );

        Self {
            flows: HashMap::with_capacity(config.max_flows.min(100_000)),
            config,
            stats: TrackerStats::default(),
            last_cleanup: Instant::now(),
        }
    }

    /// Observe a packet and return its feature snapshot
    ///
    /// Returns `None` for packets without an IP layer; callers must discard
    /// those without forwarding them downstream. Never panics on malformed
    /// input.
    pub fn observe(&mut self, pkt: &PacketRecord) -> Option<FeatureVector> {
        let (src, dst) = match (pkt.src_ip, pkt.dst_ip) {
            (Some(src), Some(dst)) => (src, dst),
            _ => {
                self.stats.non_ip_dropped += 1;
                return None;
            }
        };

        self.stats.packets_processed += 1;
        self.stats.bytes_processed += pkt.raw_len as u64;

        let key = FlowKey::new(src, dst);
        if !self.flows.contains_key(&key) {
            if self.flows.len() >= self.config.max_flows {
                self.evict_oldest();
            }
            self.flows.insert(key, FlowState::new(pkt, src));
            self.stats.flows_created += 1;
        }

        // Entry exists at this point; the borrow is scoped to the update.
        let flow = self.flows.get_mut(&key)?;
        flow.last_seen = pkt.arrival;

        let forward = src == flow.first_endpoint;
        if forward {
            flow.fwd_packets += 1;
            flow.fwd_bytes += pkt.raw_len as u64;
        } else {
            flow.bwd_packets += 1;
            flow.bwd_bytes += pkt.raw_len as u64;
        }

        let features = Self::snapshot(flow, pkt);
        self.maybe_cleanup();
        Some(features)
    }

    /// Build the per-packet snapshot from the updated aggregates
    fn snapshot(flow: &FlowState, pkt: &PacketRecord) -> FeatureVector {
        let elapsed = pkt.arrival.duration_since(flow.start);
        // Same-instant packets count as a 1us flow rather than dividing by zero
        let duration_us = (elapsed.as_micros() as u64).max(1);
        // Epsilon floor caps the burst rate instead of letting it blow up
        let elapsed_secs = elapsed.as_secs_f32().max(0.001);

        let fwd_len_mean = flow.fwd_bytes as f32 / flow.fwd_packets.max(1) as f32;
        let bwd_len_mean = flow.bwd_bytes as f32 / flow.bwd_packets.max(1) as f32;
        let packets_per_sec = flow.total_packets() as f32 / elapsed_secs;

        // Non-TCP packets carry port 0 and all-zero flags
        let (dst_port, flags) = if pkt.tcp_flags.is_some() {
            (pkt.dst_port, pkt.flags())
        } else {
            (0, Default::default())
        };

        FeatureVector {
            dst_port,
            duration_us,
            fwd_packets: flow.fwd_packets,
            bwd_packets: flow.bwd_packets,
            fwd_bytes: flow.fwd_bytes,
            bwd_bytes: flow.bwd_bytes,
            fwd_len_mean,
            bwd_len_mean,
            packets_per_sec,
            flags,
        }
    }

    /// Remove flows idle longer than the configured timeout
    pub fn cleanup(&mut self) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let now = Instant::now();

        let stale: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, flow)| now.duration_since(flow.last_seen) > idle_timeout)
            .map(|(key, _)| *key)
            .collect();

        let removed = stale.len();
        for key in stale {
            self.flows.remove(&key);
        }

        if removed > 0 {
            self.stats.flows_expired += removed as u64;
            debug!("Swept {} idle flows", removed);
        }
        removed
    }

    /// Evict the least-recently-seen flow (map at capacity)
    fn evict_oldest(&mut self) {
        if let Some(key) = self
            .flows
            .iter()
            .min_by_key(|(_, flow)| flow.last_seen)
            .map(|(key, _)| *key)
        {
            self.flows.remove(&key);
            self.stats.flows_evicted += 1;
        }
    }

    fn maybe_cleanup(&mut self) {
        if self.last_cleanup.elapsed() >= self.config.cleanup_interval() {
            self.cleanup();
            self.last_cleanup = Instant::now();
        }
    }

    /// Current flow state for a key, if tracked
    pub fn get(&self, key: &FlowKey) -> Option<&FlowState> {
        self.flows.get(key)
    }

    /// Number of active flows
    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IpProtocol;
    use std::net::Ipv4Addr;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn make_tcp_packet(src: IpAddr, dst: IpAddr, dst_port: u16, len: u32) -> PacketRecord {
        let mut pkt = PacketRecord::new(src, dst, IpProtocol::Tcp);
        pkt.dst_port = dst_port;
        pkt.tcp_flags = Some(0x02); // SYN
        pkt.raw_len = len;
        pkt
    }

    #[test]
    fn test_key_order_independence() {
        assert_eq!(FlowKey::new(addr(1), addr(2)), FlowKey::new(addr(2), addr(1)));

        let mut tracker = FlowTracker::new(FlowConfig::default());
        tracker.observe(&make_tcp_packet(addr(1), addr(2), 80, 64));
        tracker.observe(&make_tcp_packet(addr(2), addr(1), 54321, 64));

        // Both directions hit the same flow
        assert_eq!(tracker.active_flows(), 1);
        let state = tracker.get(&FlowKey::new(addr(2), addr(1))).unwrap();
        assert_eq!(state.fwd_packets, 1);
        assert_eq!(state.bwd_packets, 1);
    }

    #[test]
    fn test_non_ip_dropped() {
        let mut tracker = FlowTracker::new(FlowConfig::default());
        assert!(tracker.observe(&PacketRecord::without_ip_layer()).is_none());
        assert_eq!(tracker.active_flows(), 0);
        assert_eq!(tracker.stats().non_ip_dropped, 1);
    }

    #[test]
    fn test_counters_monotone() {
        let mut tracker = FlowTracker::new(FlowConfig::default());
        let key = FlowKey::new(addr(1), addr(2));

        let mut prev = (0u64, 0u64);
        for i in 0..10 {
            let (src, dst) = if i % 2 == 0 { (addr(1), addr(2)) } else { (addr(2), addr(1)) };
            tracker.observe(&make_tcp_packet(src, dst, 80, 100));

            let state = tracker.get(&key).unwrap();
            let cur = (state.total_packets(), state.fwd_bytes + state.bwd_bytes);
            assert!(cur.0 > prev.0);
            assert!(cur.1 > prev.1);
            prev = cur;
        }
    }

    #[test]
    fn test_duration_floor_and_means() {
        let mut tracker = FlowTracker::new(FlowConfig::default());
        let fv = tracker.observe(&make_tcp_packet(addr(1), addr(2), 80, 60)).unwrap();

        // First packet: duration floored at 1us, rate capped by the epsilon floor
        assert!(fv.duration_us >= 1);
        assert!(fv.packets_per_sec <= 1000.0);
        assert_eq!(fv.fwd_len_mean, 60.0);
        // No backward traffic yet: mean divides by max(1, 0)
        assert_eq!(fv.bwd_len_mean, 0.0);
    }

    #[test]
    fn test_non_tcp_port_and_flags() {
        let mut tracker = FlowTracker::new(FlowConfig::default());
        let mut pkt = PacketRecord::new(addr(1), addr(2), IpProtocol::Udp);
        pkt.dst_port = 53;
        pkt.raw_len = 80;

        let fv = tracker.observe(&pkt).unwrap();
        assert_eq!(fv.dst_port, 0);
        assert_eq!(fv.flags, Default::default());
    }

    #[test]
    fn test_eviction_bound() {
        let config = FlowConfig { max_flows: 4, ..Default::default() };
        let mut tracker = FlowTracker::new(config);

        for i in 1..=10u8 {
            tracker.observe(&make_tcp_packet(addr(i), addr(100), 80, 64));
            assert!(tracker.active_flows() <= 4);
        }
        assert_eq!(tracker.stats().flows_evicted, 6);
    }

    #[test]
    fn test_idle_cleanup() {
        let config = FlowConfig { idle_timeout_secs: 0, ..Default::default() };
        let mut tracker = FlowTracker::new(config);

        tracker.observe(&make_tcp_packet(addr(1), addr(2), 80, 64));
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert_eq!(tracker.cleanup(), 1);
        assert_eq!(tracker.active_flows(), 0);
    }
}
