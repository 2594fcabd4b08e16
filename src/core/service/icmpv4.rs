use crate::core::repr::{
    ipv4_protocols,
    Icmpv4Packet,
    Icmpv4Repr,
};
use crate::core::service::{
    discard,
    ipv4,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::{
    Error,
    Result,
};

/// Receives an ICMP packet from an interface.
///
/// Echo requests are turned into echo replies in place, reusing the received
/// buffer and its payload, and sent back to the sender.
pub fn recv_packet(interface: &mut Interface, mut buffer: PacketBuffer) -> Result<()> {
    let icmp_repr = Icmpv4Packet::try_new(buffer.payload()).and_then(|icmp_packet| {
        icmp_packet.check_encoding()?;
        Icmpv4Repr::deserialize(&icmp_packet)
    });

    let (id, seq) = match icmp_repr {
        Ok(Icmpv4Repr::EchoRequest { id, seq }) => (id, seq),
        Ok(_) => return discard(interface, buffer, Error::Ignored),
        Err(err) => {
            debug!("Dropping ICMP packet with {}.", err);
            return discard(interface, buffer, err);
        }
    };

    debug!(
        "Answering ICMP echo request from {} (id {}, seq {}).",
        buffer.senders_ip, id, seq
    );

    let written = Icmpv4Packet::try_new(buffer.payload_mut()).map(|mut icmp_packet| {
        Icmpv4Repr::EchoReply { id, seq }.serialize(&mut icmp_packet);
    });

    if let Err(err) = written {
        return discard(interface, buffer, err);
    }

    let dst_addr = buffer.senders_ip;
    ipv4::send_packet(interface, buffer, dst_addr, ipv4_protocols::ICMP)
}
