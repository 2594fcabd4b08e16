//! Serialization and deserialization of network packets.
//!
//! The `repr` module provides abstractions for serialization and deserializing
//! packets and frames at different network layers to/from byte buffers.

pub mod arp;
pub mod dhcp;
pub mod ethernet;
pub mod icmpv4;
pub mod ipv4;
pub mod tftp;
pub mod udp;

pub use self::arp::{
    hw_types as arp_hw_types,
    proto_types as arp_proto_types,
    Arp,
    Op as ArpOp,
};
pub use self::dhcp::{
    MessageType as DhcpMessageType,
    OpCode as DhcpOpCode,
    Packet as DhcpPacket,
    Repr as DhcpRepr,
};
pub use self::ethernet::{
    eth_types,
    Address as EthernetAddress,
    Frame as EthernetFrame,
};
pub use self::icmpv4::{
    Packet as Icmpv4Packet,
    Repr as Icmpv4Repr,
};
pub use self::ipv4::{
    flags as ipv4_flags,
    protocols as ipv4_protocols,
    Address as Ipv4Address,
    Packet as Ipv4Packet,
    Repr as Ipv4Repr,
};
pub use self::tftp::{
    error_codes as tftp_error_codes,
    Repr as TftpRepr,
};
pub use self::udp::{
    Packet as UdpPacket,
    Repr as UdpRepr,
};
