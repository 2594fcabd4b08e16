use crate::core::repr::{
    eth_types,
    EthernetAddress,
    EthernetFrame,
    Ipv4Address,
};
use crate::core::service::{
    arp,
    discard,
    ipv4,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::{
    Error,
    Result,
};

/// Sends a packet as the payload of an Ethernet frame via an interface.
///
/// The Ethernet header is written into the buffer's headroom. The buffer is
/// returned to the pool once the device has copied the frame.
pub fn send_to_mac(
    interface: &mut Interface,
    mut buffer: PacketBuffer,
    dst_addr: EthernetAddress,
    payload_type: u16,
) -> Result<()> {
    let src_addr = interface.ethernet_addr;

    let written = buffer
        .push_header(EthernetFrame::<&[u8]>::HEADER_LEN)
        .and_then(|header| {
            let mut eth_frame = EthernetFrame::try_new(header)?;
            eth_frame.set_dst_addr(dst_addr);
            eth_frame.set_src_addr(src_addr);
            eth_frame.set_payload_type(payload_type);
            Ok(())
        });

    if let Err(err) = written {
        return discard(interface, buffer, err);
    }

    let sent = interface.dev.send(buffer.payload());
    interface.pool.free(buffer);

    if let Err(ref err) = sent {
        warn!("Sending Ethernet frame to {} failed with {}.", dst_addr, err);
    }

    sent
}

/// Sends a packet to every host on the link.
pub fn broadcast(interface: &mut Interface, buffer: PacketBuffer, payload_type: u16) -> Result<()> {
    send_to_mac(interface, buffer, EthernetAddress::BROADCAST, payload_type)
}

/// Sends an IPv4 packet to a host on the link.
///
/// Broadcast addresses for the interface's subnet go straight out on the link
/// broadcast address; everything else is resolved via ARP first.
pub fn send_to_ip(interface: &mut Interface, buffer: PacketBuffer, ipv4_addr: Ipv4Address) -> Result<()> {
    if ipv4_addr.is_subnet_broadcast(interface.netmask) {
        broadcast(interface, buffer, eth_types::IPV4)
    } else {
        arp::send_to_ip(interface, buffer, ipv4_addr)
    }
}

/// Receives an Ethernet frame from an interface.
///
/// The Ethernet frame is parsed, filtered by destination, stripped of its
/// header and propagated up the network stack.
pub fn recv_frame(interface: &mut Interface, mut buffer: PacketBuffer) -> Result<()> {
    if buffer.len() <= EthernetFrame::<&[u8]>::HEADER_LEN {
        return discard(interface, buffer, Error::Malformed);
    }

    let (dst_addr, payload_type) = match EthernetFrame::try_new(buffer.payload()) {
        Ok(eth_frame) => (eth_frame.dst_addr(), eth_frame.payload_type()),
        Err(_) => return discard(interface, buffer, Error::Malformed),
    };

    if dst_addr != interface.ethernet_addr && !dst_addr.is_broadcast() {
        debug!("Ignoring Ethernet frame with destination {}.", dst_addr);
        return discard(interface, buffer, Error::Ignored);
    }

    buffer.broadcast = dst_addr.is_broadcast();
    if let Err(err) = buffer.pop_header(EthernetFrame::<&[u8]>::HEADER_LEN) {
        return discard(interface, buffer, err);
    }

    match payload_type {
        eth_types::ARP => arp::recv_packet(interface, buffer),
        eth_types::IPV4 => ipv4::recv_packet(interface, buffer),
        i => {
            debug!("Ignoring Ethernet frame with type {:#06x}.", i);
            discard(interface, buffer, Error::Ignored)
        }
    }
}
