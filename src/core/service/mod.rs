//! Packet processing services for different network layers.
//!
//! The `service` module deals with packet transmission and reception logic at
//! different layers of the network stack. Every function takes the
//! `Interface` it runs on plus ownership of the packet buffer it processes;
//! the buffer is always either handed on or returned to the interface's pool,
//! error paths included.

pub mod arp;
pub mod ethernet;
pub mod icmpv4;
pub mod ipv4;
pub mod udp;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::arp_cache::{
    ArpCache,
    ARP_CACHE_ENTRIES,
};
use crate::core::dev::Device;
use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use crate::core::service::udp::Connections;
use crate::core::storage::{
    PacketBuffer,
    PacketPool,
    PACKET_POOL_LEN,
};
use crate::core::time::{
    Env,
    Ticks,
};
use crate::{
    Error,
    Result,
};

/// An interface for sending and receiving network packets.
#[derive(Debug)]
pub struct Interface {
    /// Device for sending and receiving raw Ethernet frames.
    pub dev: Box<dyn Device>,
    /// Source of the current time.
    pub env: Box<dyn Env>,
    /// Buffers for every packet in flight.
    pub pool: PacketPool,
    /// Cache for IPv4/Ethernet address translations.
    pub arp_cache: ArpCache,
    /// UDP ports being listened on.
    pub udp_connections: Connections,
    /// Ethernet address for the interface.
    pub ethernet_addr: EthernetAddress,
    /// IPv4 address for the interface, unspecified until configured.
    pub ipv4_addr: Ipv4Address,
    /// Subnet mask for the interface, unspecified until configured.
    pub netmask: Ipv4Address,
    /// Randomness for transaction IDs and retry jitter.
    pub rng: StdRng,
}

impl Interface {
    /// Creates an interface with no IPv4 configuration.
    pub fn new(dev: Box<dyn Device>, env: Box<dyn Env>, ethernet_addr: EthernetAddress) -> Interface {
        Interface {
            dev,
            env,
            pool: PacketPool::new(PACKET_POOL_LEN),
            arp_cache: ArpCache::new(ARP_CACHE_ENTRIES),
            udp_connections: Connections::new(),
            ethernet_addr,
            ipv4_addr: Ipv4Address::UNSPECIFIED,
            netmask: Ipv4Address::UNSPECIFIED,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replaces the source of randomness, i.e. with a seeded one for
    /// reproducible runs.
    pub fn with_rng(mut self, rng: StdRng) -> Interface {
        self.rng = rng;
        self
    }

    /// Returns the current time.
    pub fn now(&self) -> Ticks {
        self.env.now()
    }

    /// Sets the IPv4 address and subnet mask of the interface.
    pub fn set_ipv4_config(&mut self, ipv4_addr: Ipv4Address, netmask: Ipv4Address) {
        info!("IPv4 configuration set to {}/{}.", ipv4_addr, netmask);
        self.ipv4_addr = ipv4_addr;
        self.netmask = netmask;
    }

    /// Clears the IPv4 address and subnet mask of the interface.
    pub fn clear_ipv4_config(&mut self) {
        info!("IPv4 configuration cleared.");
        self.ipv4_addr = Ipv4Address::UNSPECIFIED;
        self.netmask = Ipv4Address::UNSPECIFIED;
    }
}

/// Returns a packet buffer to the pool and fails with err.
pub(crate) fn discard(interface: &mut Interface, buffer: PacketBuffer, err: Error) -> Result<()> {
    interface.pool.free(buffer);
    Err(err)
}
