use crate::core::repr::{
    ipv4_protocols,
    Ipv4Address,
    Ipv4Packet,
    Ipv4Repr,
};
use crate::core::service::{
    discard,
    ethernet,
    icmpv4,
    udp,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::{
    Error,
    Result,
};

/// Sends an IPv4 packet via an interface.
///
/// The buffer holds the IPv4 payload, the header is written into the buffer's
/// headroom with our address as the source.
pub fn send_packet(
    interface: &mut Interface,
    mut buffer: PacketBuffer,
    dst_addr: Ipv4Address,
    protocol: u8,
) -> Result<()> {
    let ipv4_repr = Ipv4Repr {
        src_addr: interface.ipv4_addr,
        dst_addr,
        protocol,
        payload_len: buffer.len() as u16,
    };

    let written = buffer
        .push_header(Ipv4Packet::<&[u8]>::HEADER_LEN)
        .and_then(|header| {
            let mut ipv4_packet = Ipv4Packet::try_new(header)?;
            ipv4_repr.serialize(&mut ipv4_packet);
            Ok(())
        });

    if let Err(err) = written {
        return discard(interface, buffer, err);
    }

    ethernet::send_to_ip(interface, buffer, dst_addr)
}

/// Receives an IPv4 packet from an interface.
///
/// The IPv4 packet is validated, filtered by destination, stripped of its
/// header and dispatched to the ICMP or UDP layer.
pub fn recv_packet(interface: &mut Interface, mut buffer: PacketBuffer) -> Result<()> {
    let parsed = Ipv4Packet::try_new(buffer.payload())
        .map_err(|_| Error::Malformed)
        .and_then(|ipv4_packet| {
            ipv4_packet.check_encoding()?;
            Ok((
                ipv4_packet.header_len() as usize,
                ipv4_packet.packet_len() as usize,
                ipv4_packet.src_addr(),
                ipv4_packet.dst_addr(),
                ipv4_packet.protocol(),
            ))
        });

    let (header_len, packet_len, src_addr, dst_addr, protocol) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!("Dropping IPv4 packet with {}.", err);
            return discard(interface, buffer, err);
        }
    };

    // Link layer padding may trail the packet.
    buffer.truncate(packet_len);
    buffer.senders_ip = src_addr;
    buffer.target_ip = dst_addr;

    if !interface.ipv4_addr.is_unspecified()
        && dst_addr != interface.ipv4_addr
        && !dst_addr.is_broadcast()
    {
        debug!("Ignoring IPv4 packet with destination {}.", dst_addr);
        return discard(interface, buffer, Error::Ignored);
    }

    if let Err(err) = buffer.pop_header(header_len) {
        return discard(interface, buffer, err);
    }

    match protocol {
        ipv4_protocols::ICMP => icmpv4::recv_packet(interface, buffer),
        ipv4_protocols::UDP => udp::recv_packet(interface, buffer),
        i => {
            debug!("Ignoring IPv4 packet with protocol {}.", i);
            discard(interface, buffer, Error::Ignored)
        }
    }
}
