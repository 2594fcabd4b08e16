use crate::core::repr::{
    eth_types,
    Arp,
    ArpOp,
    EthernetAddress,
    Ipv4Address,
};
use crate::core::service::{
    discard,
    ethernet,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::{
    Error,
    Result,
};

/// Sends an ARP packet via an interface.
pub fn send_packet(interface: &mut Interface, arp_repr: &Arp, dst_addr: EthernetAddress) -> Result<()> {
    let mut buffer = interface.pool.allocate()?;

    let serialized = buffer
        .set_len(arp_repr.buffer_len())
        .and_then(|_| arp_repr.serialize(buffer.payload_mut()));

    if let Err(err) = serialized {
        return discard(interface, buffer, err);
    }

    ethernet::send_to_mac(interface, buffer, dst_addr, eth_types::ARP)
}

/// Broadcasts an ARP request for an IPv4 address.
pub fn send_request(interface: &mut Interface, ipv4_addr: Ipv4Address) -> Result<()> {
    let arp_repr = Arp {
        op: ArpOp::Request,
        source_hw_addr: interface.ethernet_addr,
        source_proto_addr: interface.ipv4_addr,
        target_hw_addr: EthernetAddress::UNSPECIFIED,
        target_proto_addr: ipv4_addr,
    };

    debug!("Sending ARP request for {}.", ipv4_addr);
    send_packet(interface, &arp_repr, EthernetAddress::BROADCAST)
}

/// Sends an IPv4 packet to a host on the link, resolving its Ethernet address
/// first if needed.
///
/// Packets for an address which is not resolved yet are queued on its ARP
/// cache entry and sent once a reply arrives. Only the first packet for an
/// address triggers a request, further requests are left to `tick(...)`.
pub fn send_to_ip(interface: &mut Interface, buffer: PacketBuffer, ipv4_addr: Ipv4Address) -> Result<()> {
    if let Some(eth_addr) = interface.arp_cache.eth_addr_for_ip(ipv4_addr) {
        return ethernet::send_to_mac(interface, buffer, eth_addr, eth_types::IPV4);
    }

    let now = interface.env.now();
    let created = interface.arp_cache.enqueue(
        ipv4_addr,
        buffer,
        now,
        &mut interface.rng,
        &mut interface.pool,
    );

    if created {
        send_request(interface, ipv4_addr)
    } else {
        Ok(())
    }
}

/// Receives an ARP packet from an interface.
///
/// Requests for our address are answered, replies resolve pending cache
/// entries and flush any packets queued on them. The buffer is always freed.
pub fn recv_packet(interface: &mut Interface, buffer: PacketBuffer) -> Result<()> {
    let arp_repr = Arp::deserialize(buffer.payload());
    let broadcast = buffer.broadcast;
    interface.pool.free(buffer);
    let arp_repr = arp_repr?;

    // Announcements target the sender's own address, so they are handled
    // before the target filter. They only ever refresh a mapping we already
    // hold, never create one or resolve a pending entry.
    if arp_repr.is_gratuitous() {
        if arp_repr.op == ArpOp::Reply
            && interface
                .arp_cache
                .refresh(arp_repr.source_proto_addr, arp_repr.source_hw_addr)
        {
            debug!(
                "Refreshed ARP mapping from {} to {}.",
                arp_repr.source_proto_addr, arp_repr.source_hw_addr
            );
            return Ok(());
        }
        return Err(Error::Ignored);
    }

    if interface.ipv4_addr.is_unspecified() || arp_repr.target_proto_addr != interface.ipv4_addr {
        debug!(
            "Ignoring ARP with target IPv4 address {}.",
            arp_repr.target_proto_addr
        );
        return Err(Error::Ignored);
    }

    match arp_repr.op {
        ArpOp::Request => {
            let arp_reply = Arp {
                op: ArpOp::Reply,
                source_hw_addr: interface.ethernet_addr,
                source_proto_addr: interface.ipv4_addr,
                target_hw_addr: arp_repr.source_hw_addr,
                target_proto_addr: arp_repr.source_proto_addr,
            };

            debug!(
                "Sending ARP reply to {}/{}.",
                arp_reply.target_proto_addr, arp_reply.target_hw_addr
            );

            send_packet(interface, &arp_reply, arp_reply.target_hw_addr)
        }
        ArpOp::Reply => {
            if broadcast {
                debug!("Ignoring broadcast ARP reply.");
                return Err(Error::Ignored);
            }

            let now = interface.env.now();
            let (ipv4_addr, eth_addr) = (arp_repr.source_proto_addr, arp_repr.source_hw_addr);
            if !interface.arp_cache.resolve(ipv4_addr, eth_addr, now) {
                debug!("Ignoring unsolicited ARP reply from {}.", ipv4_addr);
                return Err(Error::Ignored);
            }

            debug!("Resolved {} to {}.", ipv4_addr, eth_addr);
            flush(interface, ipv4_addr)
        }
    }
}

/// Runs the periodic ARP work: resending requests for unresolved addresses
/// and aging out entries.
pub fn tick(interface: &mut Interface) -> Result<()> {
    let now = interface.env.now();

    while let Some(ipv4_addr) =
        interface
            .arp_cache
            .poll_retry(now, &mut interface.rng, &mut interface.pool)
    {
        if let Err(err) = send_request(interface, ipv4_addr) {
            warn!("Resending ARP request for {} failed with {}.", ipv4_addr, err);
        }
    }

    Ok(())
}

/// Sends the packets queued on a freshly resolved address, oldest first.
fn flush(interface: &mut Interface, ipv4_addr: Ipv4Address) -> Result<()> {
    let mut result = Ok(());

    while let Some((buffer, eth_addr)) = interface.arp_cache.dequeue_pending(ipv4_addr) {
        if let Err(err) = ethernet::send_to_mac(interface, buffer, eth_addr, eth_types::IPV4) {
            result = Err(err);
        }
    }

    result
}
