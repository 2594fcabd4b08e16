#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;

use embnet::core::dev::MockDevice;
use embnet::core::repr::{
    eth_types,
    ipv4_protocols,
    Arp,
    ArpOp,
    DhcpMessageType,
    DhcpOpCode,
    DhcpPacket,
    DhcpRepr,
    EthernetAddress,
    EthernetFrame,
    Icmpv4Packet,
    Icmpv4Repr,
    Ipv4Address,
    Ipv4Packet,
    Ipv4Repr,
    UdpPacket,
    UdpRepr,
};
use embnet::core::service::Interface;
use embnet::core::stack::Stack;
use embnet::core::time::MockEnv;

lazy_static! {
    /// MAC address of the stack under test.
    pub static ref OUR_ETH_ADDR: EthernetAddress = {
        EthernetAddress::new([0x06, 0x11, 0x22, 0x33, 0x44, 0x55])
    };

    /// Static IPv4 address of the stack under test.
    pub static ref OUR_IPV4_ADDR: Ipv4Address = {
        Ipv4Address::new([10, 0, 0, 102])
    };

    pub static ref NETMASK: Ipv4Address = {
        Ipv4Address::new([255, 255, 255, 0])
    };

    /// MAC address of the host talking to the stack.
    pub static ref PEER_ETH_ADDR: EthernetAddress = {
        EthernetAddress::new([0x06, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE])
    };

    pub static ref PEER_IPV4_ADDR: Ipv4Address = {
        Ipv4Address::new([10, 0, 0, 101])
    };
}

/// A stack over a mock device and clock, with handles on both.
pub struct Context {
    pub stack: Stack,
    pub dev: MockDevice,
    pub env: MockEnv,
}

impl Context {
    /// Creates a stack without an IP address.
    pub fn new() -> Context {
        let dev = MockDevice::new();
        let env = MockEnv::new();
        let interface = Interface::new(
            Box::new(dev.clone()),
            Box::new(env.clone()),
            *OUR_ETH_ADDR,
        )
        .with_rng(StdRng::seed_from_u64(42));

        let mut stack = Stack::new(interface);
        stack.init().unwrap();

        Context { stack, dev, env }
    }

    /// Creates a stack configured with `OUR_IPV4_ADDR`.
    pub fn with_static_ip() -> Context {
        let mut context = Context::new();
        context
            .stack
            .interface
            .set_ipv4_config(*OUR_IPV4_ADDR, *NETMASK);
        context
    }

    pub fn interface(&mut self) -> &mut Interface {
        &mut self.stack.interface
    }

    /// Delivers a frame and polls the stack.
    pub fn recv(&mut self, frame: Vec<u8>) {
        self.dev.push_rx(frame);
        self.stack.poll();
    }

    /// Moves the clock forward and polls the stack.
    pub fn advance(&mut self, ticks: u32) {
        self.env.advance(ticks);
        self.stack.poll();
    }

    /// Takes every frame sent so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.dev.drain_tx().iter().map(|frame| Sent::parse(frame)).collect()
    }

    /// Takes the UDP datagrams sent so far, skipping anything else.
    pub fn sent_udp(&self) -> Vec<Datagram> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Udp(datagram) => Some(datagram),
                _ => None,
            })
            .collect()
    }

    /// Asserts every packet buffer went back to the pool.
    pub fn assert_no_leaks(&self) {
        assert_eq!(self.stack.interface.pool.outstanding(), 0);
    }
}

/// A UDP datagram sent by the stack.
#[derive(Clone, Debug)]
pub struct Datagram {
    pub dst_eth_addr: EthernetAddress,
    pub src_addr: Ipv4Address,
    pub dst_addr: Ipv4Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn dhcp(&self) -> DhcpRepr {
        let dhcp_packet = DhcpPacket::try_new(&self.payload[..]).unwrap();
        dhcp_packet.check_encoding().unwrap();
        DhcpRepr::parse(&dhcp_packet).unwrap()
    }
}

/// A frame sent by the stack.
#[derive(Clone, Debug)]
pub enum Sent {
    Arp {
        dst_eth_addr: EthernetAddress,
        arp: Arp,
    },
    Icmp {
        dst_eth_addr: EthernetAddress,
        dst_addr: Ipv4Address,
        icmp_repr: Icmpv4Repr,
        payload: Vec<u8>,
    },
    Udp(Datagram),
}

impl Sent {
    pub fn parse(frame: &[u8]) -> Sent {
        let eth_frame = EthernetFrame::try_new(frame).unwrap();
        assert_eq!(eth_frame.src_addr(), *OUR_ETH_ADDR);
        let dst_eth_addr = eth_frame.dst_addr();

        if eth_frame.payload_type() == eth_types::ARP {
            return Sent::Arp {
                dst_eth_addr,
                arp: Arp::deserialize(eth_frame.payload()).unwrap(),
            };
        }

        assert_eq!(eth_frame.payload_type(), eth_types::IPV4);
        let ipv4_packet = Ipv4Packet::try_new(eth_frame.payload()).unwrap();
        ipv4_packet.check_encoding().unwrap();

        match ipv4_packet.protocol() {
            ipv4_protocols::ICMP => {
                let icmp_packet = Icmpv4Packet::try_new(ipv4_packet.payload()).unwrap();
                icmp_packet.check_encoding().unwrap();
                Sent::Icmp {
                    dst_eth_addr,
                    dst_addr: ipv4_packet.dst_addr(),
                    icmp_repr: Icmpv4Repr::deserialize(&icmp_packet).unwrap(),
                    payload: icmp_packet.payload().to_vec(),
                }
            }
            ipv4_protocols::UDP => {
                let ipv4_repr = Ipv4Repr {
                    src_addr: ipv4_packet.src_addr(),
                    dst_addr: ipv4_packet.dst_addr(),
                    protocol: ipv4_protocols::UDP,
                    payload_len: ipv4_packet.payload().len() as u16,
                };
                let udp_packet = UdpPacket::try_new(ipv4_packet.payload()).unwrap();
                udp_packet.check_encoding(&ipv4_repr).unwrap();
                Sent::Udp(Datagram {
                    dst_eth_addr,
                    src_addr: ipv4_repr.src_addr,
                    dst_addr: ipv4_repr.dst_addr,
                    src_port: udp_packet.src_port(),
                    dst_port: udp_packet.dst_port(),
                    payload: udp_packet.payload().to_vec(),
                })
            }
            protocol => panic!("Unexpected IPv4 protocol {}.", protocol),
        }
    }

    pub fn as_arp(&self) -> Option<&Arp> {
        match *self {
            Sent::Arp { ref arp, .. } => Some(arp),
            _ => None,
        }
    }
}

/// Builds an Ethernet frame around a payload.
pub fn eth_frame(src: EthernetAddress, dst: EthernetAddress, payload_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0; EthernetFrame::<&[u8]>::buffer_len(payload.len())];
    {
        let mut eth_frame = EthernetFrame::try_new(&mut frame[..]).unwrap();
        eth_frame.set_src_addr(src);
        eth_frame.set_dst_addr(dst);
        eth_frame.set_payload_type(payload_type);
        eth_frame.payload_mut().copy_from_slice(payload);
    }
    frame
}

/// Builds an ARP frame from the peer.
pub fn arp_frame(dst: EthernetAddress, arp: &Arp) -> Vec<u8> {
    let mut buffer = vec![0; Arp::BUFFER_LEN];
    arp.serialize(&mut buffer).unwrap();
    eth_frame(arp.source_hw_addr, dst, eth_types::ARP, &buffer)
}

/// Builds the peer's ARP reply to the stack.
pub fn arp_reply(peer_eth_addr: EthernetAddress, peer_ipv4_addr: Ipv4Address) -> Vec<u8> {
    arp_frame(
        *OUR_ETH_ADDR,
        &Arp {
            op: ArpOp::Reply,
            source_hw_addr: peer_eth_addr,
            source_proto_addr: peer_ipv4_addr,
            target_hw_addr: *OUR_ETH_ADDR,
            target_proto_addr: *OUR_IPV4_ADDR,
        },
    )
}

/// Builds an IPv4 frame, the payload holding the transport header.
pub fn ipv4_frame(
    src_eth_addr: EthernetAddress,
    dst_eth_addr: EthernetAddress,
    ipv4_repr: &Ipv4Repr,
    payload: &[u8],
) -> Vec<u8> {
    let mut buffer = vec![0; ipv4_repr.buffer_len()];
    {
        let mut ipv4_packet = Ipv4Packet::try_new(&mut buffer[..]).unwrap();
        ipv4_repr.serialize(&mut ipv4_packet);
    }
    buffer[Ipv4Packet::<&[u8]>::HEADER_LEN ..].copy_from_slice(payload);
    eth_frame(src_eth_addr, dst_eth_addr, eth_types::IPV4, &buffer)
}

/// Builds a UDP frame with a valid checksum.
pub fn udp_frame(
    src_eth_addr: EthernetAddress,
    dst_eth_addr: EthernetAddress,
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = UdpPacket::<&[u8]>::buffer_len(payload.len());
    let ipv4_repr = Ipv4Repr {
        src_addr,
        dst_addr,
        protocol: ipv4_protocols::UDP,
        payload_len: udp_len as u16,
    };
    let udp_repr = UdpRepr {
        src_port,
        dst_port,
        length: udp_len as u16,
    };

    let mut buffer = vec![0; udp_len];
    {
        let mut udp_packet = UdpPacket::try_new(&mut buffer[..]).unwrap();
        udp_packet.payload_mut().copy_from_slice(payload);
        udp_repr.serialize(&mut udp_packet, &ipv4_repr);
    }
    ipv4_frame(src_eth_addr, dst_eth_addr, &ipv4_repr, &buffer)
}

/// Builds a UDP frame from the peer to the stack.
pub fn peer_udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    udp_frame(
        *PEER_ETH_ADDR,
        *OUR_ETH_ADDR,
        *PEER_IPV4_ADDR,
        *OUR_IPV4_ADDR,
        src_port,
        dst_port,
        payload,
    )
}

/// Builds an ICMP echo request from the peer to an address.
pub fn echo_request(dst_addr: Ipv4Address, id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let icmp_len = Icmpv4Packet::<&[u8]>::buffer_len(payload.len());
    let ipv4_repr = Ipv4Repr {
        src_addr: *PEER_IPV4_ADDR,
        dst_addr,
        protocol: ipv4_protocols::ICMP,
        payload_len: icmp_len as u16,
    };

    let mut buffer = vec![0; icmp_len];
    {
        let mut icmp_packet = Icmpv4Packet::try_new(&mut buffer[..]).unwrap();
        icmp_packet.payload_mut().copy_from_slice(payload);
        Icmpv4Repr::EchoRequest { id, seq }.serialize(&mut icmp_packet);
    }
    ipv4_frame(*PEER_ETH_ADDR, *OUR_ETH_ADDR, &ipv4_repr, &buffer)
}

/// A scripted DHCP server handing out one address.
pub struct DhcpServer {
    pub eth_addr: EthernetAddress,
    pub ipv4_addr: Ipv4Address,
    pub offered_addr: Ipv4Address,
    pub netmask: Ipv4Address,
    /// Lease time in seconds.
    pub lease_time: u32,
}

impl DhcpServer {
    pub fn new() -> DhcpServer {
        DhcpServer {
            eth_addr: *PEER_ETH_ADDR,
            ipv4_addr: *PEER_IPV4_ADDR,
            offered_addr: *OUR_IPV4_ADDR,
            netmask: *NETMASK,
            lease_time: 3600,
        }
    }

    /// Builds a reply to a client message, broadcast from port 67 to 68.
    pub fn reply(&self, request: &DhcpRepr, message_type: DhcpMessageType) -> Vec<u8> {
        let mut dhcp_repr = DhcpRepr::request(
            message_type,
            request.transaction_id,
            request.client_hw_addr,
        );
        dhcp_repr.op = DhcpOpCode::Reply;
        dhcp_repr.server_id = Some(self.ipv4_addr);
        if message_type != DhcpMessageType::Nak {
            dhcp_repr.your_ip = self.offered_addr;
            dhcp_repr.netmask = Some(self.netmask);
            dhcp_repr.lease_time = Some(self.lease_time);
        }

        let mut buffer = vec![0; dhcp_repr.buffer_len()];
        {
            let mut dhcp_packet = DhcpPacket::try_new(&mut buffer[..]).unwrap();
            dhcp_repr.emit(&mut dhcp_packet).unwrap();
        }

        udp_frame(
            self.eth_addr,
            EthernetAddress::BROADCAST,
            self.ipv4_addr,
            Ipv4Address::BROADCAST,
            67,
            68,
            &buffer,
        )
    }
}
