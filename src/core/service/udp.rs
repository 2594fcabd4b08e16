use crate::core::repr::{
    ipv4_protocols,
    Ipv4Address,
    Ipv4Repr,
    UdpPacket,
    UdpRepr,
};
use crate::core::service::{
    discard,
    ipv4,
    Interface,
};
use crate::core::storage::{
    PacketBuffer,
    Ring,
};
use crate::{
    Error,
    Result,
};

/// Maximum number of ports an interface listens on at once.
pub const UDP_MAX_CONNECTIONS: usize = 8;

/// A port being listened on, with the datagrams received for it.
#[derive(Debug)]
struct Connection {
    port: u16,
    queue: Ring<PacketBuffer>,
}

/// Fixed size table of the UDP ports an interface listens on.
#[derive(Debug)]
pub struct Connections {
    connections: Vec<Connection>,
}

impl Connections {
    pub fn new() -> Connections {
        Connections {
            connections: Vec::with_capacity(UDP_MAX_CONNECTIONS),
        }
    }

    /// Returns the number of ports being listened on.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.position(port).is_some()
    }

    /// Returns the number of datagrams waiting on a port.
    pub fn queue_len(&self, port: u16) -> usize {
        self.position(port)
            .map_or(0, |i| self.connections[i].queue.len())
    }

    fn position(&self, port: u16) -> Option<usize> {
        self.connections
            .iter()
            .position(|connection| connection.port == port)
    }
}

impl Default for Connections {
    fn default() -> Connections {
        Connections::new()
    }
}

/// Starts listening on a port, keeping at most depth received datagrams
/// queued.
///
/// Listening on a port again changes its depth, dropping the oldest queued
/// datagrams that no longer fit.
pub fn listen(interface: &mut Interface, port: u16, depth: usize) -> Result<()> {
    let mut queue = Ring::with_capacity(depth);

    match interface.udp_connections.position(port) {
        Some(i) => {
            let old_queue = &mut interface.udp_connections.connections[i].queue;
            while let Ok(buffer) = old_queue.dequeue() {
                if let Some(evicted) = queue.enqueue_evicting(buffer) {
                    interface.pool.free(evicted);
                }
            }
            interface.udp_connections.connections[i].queue = queue;
        }
        None => {
            if interface.udp_connections.len() >= UDP_MAX_CONNECTIONS {
                warn!("No room to listen on UDP port {}.", port);
                return Err(Error::Exhausted);
            }
            interface
                .udp_connections
                .connections
                .push(Connection { port, queue });
        }
    }

    debug!("Listening on UDP port {} with depth {}.", port, depth);
    Ok(())
}

/// Stops listening on a port, freeing any datagrams queued on it.
pub fn unlisten(interface: &mut Interface, port: u16) -> bool {
    match interface.udp_connections.position(port) {
        Some(i) => {
            let mut connection = interface.udp_connections.connections.remove(i);
            while let Ok(buffer) = connection.queue.dequeue() {
                interface.pool.free(buffer);
            }
            debug!("Stopped listening on UDP port {}.", port);
            true
        }
        None => false,
    }
}

/// Sends a UDP datagram via an interface.
///
/// The buffer holds the UDP payload, the header is written into the buffer's
/// headroom.
pub fn send_packet(
    interface: &mut Interface,
    mut buffer: PacketBuffer,
    src_port: u16,
    dst_port: u16,
    dst_addr: Ipv4Address,
) -> Result<()> {
    let udp_len = UdpPacket::<&[u8]>::buffer_len(buffer.len());
    if udp_len > u16::max_value() as usize {
        return discard(interface, buffer, Error::Exhausted);
    }

    let udp_repr = UdpRepr {
        src_port,
        dst_port,
        length: udp_len as u16,
    };
    let ipv4_repr = Ipv4Repr {
        src_addr: interface.ipv4_addr,
        dst_addr,
        protocol: ipv4_protocols::UDP,
        payload_len: udp_len as u16,
    };

    let written = buffer
        .push_header(UdpPacket::<&[u8]>::HEADER_LEN)
        .map(|_| ())
        .and_then(|_| {
            let mut udp_packet = UdpPacket::try_new(buffer.payload_mut())?;
            udp_repr.serialize(&mut udp_packet, &ipv4_repr);
            Ok(())
        });

    if let Err(err) = written {
        return discard(interface, buffer, err);
    }

    ipv4::send_packet(interface, buffer, dst_addr, ipv4_protocols::UDP)
}

/// Sends a copy of data as a UDP datagram via an interface.
pub fn send(
    interface: &mut Interface,
    data: &[u8],
    src_port: u16,
    dst_port: u16,
    dst_addr: Ipv4Address,
) -> Result<()> {
    let mut buffer = interface.pool.allocate()?;
    if let Err(err) = buffer.copy_from(data) {
        return discard(interface, buffer, err);
    }

    send_packet(interface, buffer, src_port, dst_port, dst_addr)
}

/// Takes the oldest datagram received on a port.
///
/// The buffer holds the UDP payload with the sender's address and port
/// recorded on it. Hand it back with `interface.pool.free(...)` when done.
pub fn recv(interface: &mut Interface, port: u16) -> Option<PacketBuffer> {
    let i = interface.udp_connections.position(port)?;
    interface.udp_connections.connections[i].queue.dequeue().ok()
}

/// Copies the oldest datagram received on a port into buffer.
///
/// Payloads larger than buffer are truncated.
///
/// # Returns
///
/// The number of bytes copied plus the sender's address and port, or
/// Error::Exhausted if nothing was received.
pub fn recv_into(interface: &mut Interface, port: u16, buffer: &mut [u8]) -> Result<(usize, Ipv4Address, u16)> {
    let packet = recv(interface, port).ok_or(Error::Exhausted)?;

    let len = packet.len().min(buffer.len());
    buffer[.. len].copy_from_slice(&packet.payload()[.. len]);
    let (senders_ip, source_port) = (packet.senders_ip, packet.source_port);
    interface.pool.free(packet);

    Ok((len, senders_ip, source_port))
}

/// Receives a UDP datagram from an interface.
///
/// The datagram is validated, stripped of its header and queued on the
/// listening port. Datagrams for ports nobody listens on are dropped.
pub fn recv_packet(interface: &mut Interface, mut buffer: PacketBuffer) -> Result<()> {
    let (senders_ip, target_ip) = (buffer.senders_ip, buffer.target_ip);

    let udp_repr = UdpPacket::try_new(buffer.payload()).and_then(|udp_packet| {
        let ipv4_repr = Ipv4Repr {
            src_addr: senders_ip,
            dst_addr: target_ip,
            protocol: ipv4_protocols::UDP,
            payload_len: udp_packet.length(),
        };
        udp_packet.check_encoding(&ipv4_repr)?;
        Ok(UdpRepr::deserialize(&udp_packet))
    });

    let udp_repr = match udp_repr {
        Ok(udp_repr) => udp_repr,
        Err(err) => {
            debug!("Dropping UDP packet with {}.", err);
            return discard(interface, buffer, err);
        }
    };

    buffer.truncate(udp_repr.length as usize);
    buffer.source_port = udp_repr.src_port;
    if let Err(err) = buffer.pop_header(UdpPacket::<&[u8]>::HEADER_LEN) {
        return discard(interface, buffer, err);
    }

    let i = match interface.udp_connections.position(udp_repr.dst_port) {
        Some(i) => i,
        None => {
            debug!("Ignoring UDP packet for port {}.", udp_repr.dst_port);
            return discard(interface, buffer, Error::Ignored);
        }
    };

    let connection = &mut interface.udp_connections.connections[i];
    if let Some(evicted) = connection.queue.enqueue_evicting(buffer) {
        debug!(
            "Dropping oldest UDP packet queued on port {}.",
            connection.port
        );
        interface.pool.free(evicted);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dev::MockDevice;
    use crate::core::repr::{
        EthernetAddress,
        EthernetFrame,
        Ipv4Packet,
    };
    use crate::core::time::MockEnv;

    fn interface() -> (Interface, MockDevice) {
        let dev = MockDevice::new();
        let mut interface = Interface::new(
            Box::new(dev.clone()),
            Box::new(MockEnv::new()),
            EthernetAddress::new([0x02, 0, 0, 0, 0, 1]),
        );
        interface.set_ipv4_config(
            Ipv4Address::new([10, 0, 0, 1]),
            Ipv4Address::new([255, 255, 255, 0]),
        );
        (interface, dev)
    }

    fn udp_buffer(interface: &mut Interface, dst_port: u16, payload: &[u8]) -> PacketBuffer {
        let senders_ip = Ipv4Address::new([10, 0, 0, 2]);
        let udp_len = UdpPacket::<&[u8]>::buffer_len(payload.len());
        let udp_repr = UdpRepr {
            src_port: 1000,
            dst_port,
            length: udp_len as u16,
        };
        let ipv4_repr = Ipv4Repr {
            src_addr: senders_ip,
            dst_addr: interface.ipv4_addr,
            protocol: ipv4_protocols::UDP,
            payload_len: udp_len as u16,
        };

        let mut buffer = interface.pool.allocate().unwrap();
        buffer.set_len(udp_len).unwrap();
        {
            let mut udp_packet = UdpPacket::try_new(buffer.payload_mut()).unwrap();
            udp_packet.payload_mut().copy_from_slice(payload);
            udp_repr.serialize(&mut udp_packet, &ipv4_repr);
        }
        buffer.senders_ip = senders_ip;
        buffer.target_ip = interface.ipv4_addr;
        buffer
    }

    #[test]
    fn test_listen_table_full() {
        let (mut interface, _) = interface();
        for port in 0 .. UDP_MAX_CONNECTIONS as u16 {
            listen(&mut interface, port, 1).unwrap();
        }
        assert_matches!(listen(&mut interface, 100, 1), Err(Error::Exhausted));
        // Listening again on a known port needs no new slot.
        assert_matches!(listen(&mut interface, 0, 2), Ok(()));
    }

    #[test]
    fn test_recv_queues_at_most_depth() {
        let (mut interface, _) = interface();
        listen(&mut interface, 53, 2).unwrap();

        for i in 0 .. 3 {
            let buffer = udp_buffer(&mut interface, 53, &[i]);
            recv_packet(&mut interface, buffer).unwrap();
        }

        assert_eq!(interface.udp_connections.queue_len(53), 2);
        assert_eq!(interface.pool.outstanding(), 2);

        let mut data = [0; 16];
        assert_eq!(
            recv_into(&mut interface, 53, &mut data).unwrap(),
            (1, Ipv4Address::new([10, 0, 0, 2]), 1000)
        );
        assert_eq!(data[0], 1);
        assert_eq!(recv_into(&mut interface, 53, &mut data).unwrap().0, 1);
        assert_eq!(data[0], 2);
        assert_matches!(recv_into(&mut interface, 53, &mut data), Err(Error::Exhausted));
        assert_eq!(interface.pool.outstanding(), 0);
    }

    #[test]
    fn test_recv_without_listener() {
        let (mut interface, _) = interface();
        let buffer = udp_buffer(&mut interface, 53, b"hello");
        assert_matches!(recv_packet(&mut interface, buffer), Err(Error::Ignored));
        assert_eq!(interface.pool.outstanding(), 0);
    }

    #[test]
    fn test_recv_with_bad_checksum() {
        let (mut interface, _) = interface();
        listen(&mut interface, 53, 1).unwrap();
        let mut buffer = udp_buffer(&mut interface, 53, b"hello");
        buffer.payload_mut()[8] ^= 0x01;
        assert_matches!(recv_packet(&mut interface, buffer), Err(Error::Checksum));
        assert_eq!(interface.pool.outstanding(), 0);
    }

    #[test]
    fn test_relisten_shrinks_queue() {
        let (mut interface, _) = interface();
        listen(&mut interface, 53, 3).unwrap();
        for i in 0 .. 3 {
            let buffer = udp_buffer(&mut interface, 53, &[i]);
            recv_packet(&mut interface, buffer).unwrap();
        }

        listen(&mut interface, 53, 1).unwrap();
        assert_eq!(interface.udp_connections.queue_len(53), 1);
        assert_eq!(interface.pool.outstanding(), 1);

        let buffer = recv(&mut interface, 53).unwrap();
        assert_eq!(buffer.payload(), &[2]);
        interface.pool.free(buffer);
    }

    #[test]
    fn test_unlisten_frees_queue() {
        let (mut interface, _) = interface();
        listen(&mut interface, 53, 2).unwrap();
        let buffer = udp_buffer(&mut interface, 53, b"hello");
        recv_packet(&mut interface, buffer).unwrap();

        assert!(unlisten(&mut interface, 53));
        assert!(!unlisten(&mut interface, 53));
        assert!(!interface.udp_connections.is_listening(53));
        assert_eq!(interface.pool.outstanding(), 0);
    }

    #[test]
    fn test_send_writes_header_and_checksum() {
        let (mut interface, dev) = interface();
        send(
            &mut interface,
            b"hello",
            68,
            67,
            Ipv4Address::BROADCAST,
        ).unwrap();

        let frame = dev.pop_tx().unwrap();
        let eth_frame = EthernetFrame::try_new(&frame[..]).unwrap();
        assert_eq!(eth_frame.dst_addr(), EthernetAddress::BROADCAST);

        let ipv4_packet = Ipv4Packet::try_new(eth_frame.payload()).unwrap();
        let ipv4_repr = Ipv4Repr {
            src_addr: ipv4_packet.src_addr(),
            dst_addr: ipv4_packet.dst_addr(),
            protocol: ipv4_packet.protocol(),
            payload_len: ipv4_packet.packet_len() - 20,
        };

        let udp_packet = UdpPacket::try_new(ipv4_packet.payload()).unwrap();
        assert_matches!(udp_packet.check_encoding(&ipv4_repr), Ok(_));
        assert_eq!(
            UdpRepr::deserialize(&udp_packet),
            UdpRepr {
                src_port: 68,
                dst_port: 67,
                length: 13,
            }
        );
        assert_eq!(udp_packet.payload(), b"hello");
        assert_eq!(interface.pool.outstanding(), 0);
    }
}
