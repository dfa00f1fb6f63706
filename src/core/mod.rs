//! Core packet types shared by every pipeline stage

pub mod packet;

pub use packet::{IpProtocol, PacketRecord, TcpFlags};
