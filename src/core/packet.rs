//! Parsed packet descriptor
//!
//! The capture layer delivers packets already parsed into this shape; the
//! pipeline never touches raw bytes.

use std::net::IpAddr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// IP protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
    Icmpv6,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(val: u8) -> Self {
        match val {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            58 => IpProtocol::Icmpv6,
            other => IpProtocol::Other(other),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(val: IpProtocol) -> Self {
        match val {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Icmpv6 => 58,
            IpProtocol::Other(v) => v,
        }
    }
}

impl std::fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpProtocol::Icmp => write!(f, "ICMP"),
            IpProtocol::Tcp => write!(f, "TCP"),
            IpProtocol::Udp => write!(f, "UDP"),
            IpProtocol::Icmpv6 => write!(f, "ICMPv6"),
            IpProtocol::Other(n) => write!(f, "Proto({})", n),
        }
    }
}

/// TCP flags decoded from the wire bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

impl TcpFlags {
    /// Decode from the fixed bit positions of the TCP header flags byte
    pub fn from_u8(flags: u8) -> Self {
        Self {
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
            psh: flags & 0x08 != 0,
            ack: flags & 0x10 != 0,
            urg: flags & 0x20 != 0,
            ece: flags & 0x40 != 0,
            cwr: flags & 0x80 != 0,
        }
    }

    pub fn to_u8(&self) -> u8 {
        let mut flags = 0u8;
        if self.fin { flags |= 0x01; }
        if self.syn { flags |= 0x02; }
        if self.rst { flags |= 0x04; }
        if self.psh { flags |= 0x08; }
        if self.ack { flags |= 0x10; }
        if self.urg { flags |= 0x20; }
        if self.ece { flags |= 0x40; }
        if self.cwr { flags |= 0x80; }
        flags
    }
}

impl std::fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        if self.syn { s.push('S'); }
        if self.ack { s.push('A'); }
        if self.fin { s.push('F'); }
        if self.rst { s.push('R'); }
        if self.psh { s.push('P'); }
        if self.urg { s.push('U'); }
        if self.ece { s.push('E'); }
        if self.cwr { s.push('C'); }
        if s.is_empty() { s.push('.'); }
        write!(f, "{}", s)
    }
}

/// A single parsed packet as delivered by the capture callback
///
/// `src_ip`/`dst_ip` are `None` when the packet carried no IP layer; such
/// packets are dropped by the flow tracker. `tcp_flags` holds the raw flags
/// byte and is `None` for non-TCP packets.
#[derive(Debug, Clone)]
pub struct PacketRecord {
    /// Wall-clock arrival time (persisted with the decision)
    pub timestamp: DateTime<Utc>,
    /// Monotonic arrival time (used for flow timing)
    pub arrival: Instant,
    /// Source address, if an IP layer was present
    pub src_ip: Option<IpAddr>,
    /// Destination address, if an IP layer was present
    pub dst_ip: Option<IpAddr>,
    /// Transport protocol
    pub protocol: IpProtocol,
    /// Destination port (TCP only, 0 otherwise)
    pub dst_port: u16,
    /// Raw TCP flags byte, if a TCP layer was present
    pub tcp_flags: Option<u8>,
    /// Total packet length including headers
    pub raw_len: u32,
}

impl PacketRecord {
    /// Create a minimal record with both IP endpoints set
    pub fn new(src_ip: IpAddr, dst_ip: IpAddr, protocol: IpProtocol) -> Self {
        Self {
            timestamp: Utc::now(),
            arrival: Instant::now(),
            src_ip: Some(src_ip),
            dst_ip: Some(dst_ip),
            protocol,
            dst_port: 0,
            tcp_flags: None,
            raw_len: 0,
        }
    }

    /// Create a record with no IP layer (dropped by the tracker)
    pub fn without_ip_layer() -> Self {
        Self {
            timestamp: Utc::now(),
            arrival: Instant::now(),
            src_ip: None,
            dst_ip: None,
            protocol: IpProtocol::Other(0),
            dst_port: 0,
            tcp_flags: None,
            raw_len: 0,
        }
    }

    /// Whether the packet carried an IP layer
    pub fn has_ip_layer(&self) -> bool {
        self.src_ip.is_some() && self.dst_ip.is_some()
    }

    /// Decoded TCP flags (all-zero when no TCP layer)
    pub fn flags(&self) -> TcpFlags {
        self.tcp_flags.map(TcpFlags::from_u8).unwrap_or_default()
    }
}
