use std::fmt::{
    Display,
    Formatter,
    Result as FmtResult,
};
use std::net::Ipv4Addr;
use std::result::Result as StdResult;
use std::str::FromStr;

use byteorder::{
    NetworkEndian,
    ReadBytesExt,
    WriteBytesExt,
};

use crate::core::check::internet_checksum;
use crate::{
    Error,
    Result,
};

/// [IPv4 address](https://en.wikipedia.org/wiki/IPv4) in network byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address([u8; 4]);

impl Address {
    pub const BROADCAST: Address = Address([0xFF; 4]);

    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    /// Creates an IPv4 address from a network byte order buffer.
    pub fn new(addr: [u8; 4]) -> Address {
        Address(addr)
    }

    /// Tries to create an IPv4 address from a network byte order slice.
    pub fn try_new(addr: &[u8]) -> Result<Address> {
        if addr.len() != 4 {
            return Err(Error::Exhausted);
        }

        let mut _addr: [u8; 4] = [0; 4];
        _addr.clone_from_slice(addr);
        Ok(Address(_addr))
    }

    /// Returns a reference to the network byte order representation of the
    /// address.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the address as a host order integer.
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Checks if this is the all ones broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 4]
    }

    /// Checks if this is the all zeros address.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0x00; 4]
    }

    /// Checks if every host bit of the address is set for a subnet mask,
    /// i.e. the address is a directed broadcast on that subnet.
    ///
    /// With an unspecified netmask only the all ones address qualifies.
    pub fn is_subnet_broadcast(&self, netmask: Address) -> bool {
        (!self.as_u32() & !netmask.as_u32()) == 0
    }
}

impl From<u32> for Address {
    fn from(addr: u32) -> Address {
        Address(addr.to_be_bytes())
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Address {
        Address(addr.octets())
    }
}

impl From<Address> for Ipv4Addr {
    fn from(addr: Address) -> Ipv4Addr {
        Ipv4Addr::from(addr.0)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl FromStr for Address {
    type Err = ();

    /// Parses an IPv4 address from an A.B.C.D style string.
    fn from_str(addr: &str) -> StdResult<Address, Self::Err> {
        let mut ipv4: [u8; 4] = [0; 4];
        let mut tokens = addr.split('.');

        for byte in ipv4.iter_mut() {
            let token = tokens.next().ok_or(())?;
            if token.is_empty() || !token.bytes().all(|c| c.is_ascii_digit()) {
                return Err(());
            }
            *byte = token.parse::<u8>().map_err(|_| ())?;
        }

        if tokens.next().is_some() {
            return Err(());
        }

        Ok(Address::new(ipv4))
    }
}

/// [https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml](https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml)
pub mod protocols {
    pub const ICMP: u8 = 1;

    pub const UDP: u8 = 17;
}

/// Bits of the flags/fragment offset word.
pub mod flags {
    pub const DONT_FRAGMENT: u16 = 0x4000;

    pub const MORE_FRAGMENTS: u16 = 0x2000;
}

/// [https://en.wikipedia.org/wiki/IPv4#Header](https://en.wikipedia.org/wiki/IPv4#Header)
mod fields {
    use std::ops::Range;

    pub const VERSION_AND_HEADER_LEN: usize = 0;

    pub const DSCP_AND_ECN: usize = 1;

    pub const PACKET_LEN: Range<usize> = 2 .. 4;

    pub const IDENTIFICATION: Range<usize> = 4 .. 6;

    pub const FLAGS_AND_FRAGMENT_OFFSET: Range<usize> = 6 .. 8;

    pub const TTL: usize = 8;

    pub const PROTOCOL: usize = 9;

    pub const CHECKSUM: Range<usize> = 10 .. 12;

    pub const SRC_ADDR: Range<usize> = 12 .. 16;

    pub const DST_ADDR: Range<usize> = 16 .. 20;
}

/// Safe representation of an IPv4 header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub protocol: u8,
    pub payload_len: u16,
}

impl Repr {
    /// Returns the size of the IPv4 packet, header and payload, described by
    /// this header.
    pub fn buffer_len(&self) -> usize {
        Packet::<&[u8]>::HEADER_LEN + self.payload_len as usize
    }

    /// Serializes the header, including a checksum, into the first HEADER_LEN
    /// bytes of a packet. Outgoing packets never fragment.
    pub fn serialize<T>(&self, packet: &mut Packet<T>)
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        packet.set_version_and_header_len(4, Packet::<&[u8]>::HEADER_LEN as u8);
        packet.set_dscp_and_ecn(0);
        packet.set_packet_len(self.buffer_len() as u16);
        packet.set_identification(0);
        packet.set_flags_and_fragment_offset(flags::DONT_FRAGMENT);
        packet.set_ttl(Packet::<&[u8]>::DEFAULT_TTL);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
        packet.fill_checksum();
    }
}

/// View of a byte buffer as an IPv4 packet.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> AsMut<[u8]> for Packet<T> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut()
    }
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const HEADER_LEN: usize = 20;

    pub const DEFAULT_TTL: u8 = 255;

    /// Tries to create an IPv4 packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of an IPv4 packet with no options and the specified
    /// payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    /// Checks if the packet has a valid encoding: version 4, a header that
    /// fits in both the buffer and the declared packet length, a declared
    /// packet length that fits in the buffer, no further fragments, and a
    /// valid header checksum.
    ///
    /// The buffer may be longer than the declared packet length since short
    /// Ethernet frames are padded.
    pub fn check_encoding(&self) -> Result<()> {
        let buffer_len = self.buffer.as_ref().len();
        let header_len = self.header_len() as usize;

        if self.ip_version() != 4
            || header_len < Self::HEADER_LEN
            || header_len > buffer_len
            || (self.packet_len() as usize) < header_len
            || self.packet_len() as usize > buffer_len
        {
            Err(Error::Malformed)
        } else if self.flags_and_fragment_offset() & flags::MORE_FRAGMENTS != 0 {
            Err(Error::Malformed)
        } else if internet_checksum(self.buffer.as_ref()[.. header_len].iter().cloned()) != 0 {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    /// Calculates the header checksum, treating the checksum field as zero.
    pub fn gen_header_checksum(&self) -> u16 {
        let header_len = (self.header_len() as usize).min(self.buffer.as_ref().len());
        let header = &self.buffer.as_ref()[.. header_len];
        let iter = header
            .iter()
            .enumerate()
            .map(|(i, byte)| if fields::CHECKSUM.contains(&i) { 0 } else { *byte });
        internet_checksum(iter)
    }

    pub fn ip_version(&self) -> u8 {
        (self.buffer.as_ref()[fields::VERSION_AND_HEADER_LEN] & 0xF0) >> 4
    }

    /// Returns the header length in bytes.
    pub fn header_len(&self) -> u8 {
        (self.buffer.as_ref()[fields::VERSION_AND_HEADER_LEN] & 0x0F) * 4
    }

    pub fn dscp(&self) -> u8 {
        (self.buffer.as_ref()[fields::DSCP_AND_ECN] & 0xFC) >> 2
    }

    pub fn ecn(&self) -> u8 {
        self.buffer.as_ref()[fields::DSCP_AND_ECN] & 0x03
    }

    pub fn packet_len(&self) -> u16 {
        (&self.buffer.as_ref()[fields::PACKET_LEN])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn identification(&self) -> u16 {
        (&self.buffer.as_ref()[fields::IDENTIFICATION])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn flags_and_fragment_offset(&self) -> u16 {
        (&self.buffer.as_ref()[fields::FLAGS_AND_FRAGMENT_OFFSET])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[fields::TTL]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer.as_ref()[fields::PROTOCOL]
    }

    pub fn header_checksum(&self) -> u16 {
        (&self.buffer.as_ref()[fields::CHECKSUM])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn src_addr(&self) -> Address {
        let mut addr = [0; 4];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::SRC_ADDR]);
        Address(addr)
    }

    pub fn dst_addr(&self) -> Address {
        let mut addr = [0; 4];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::DST_ADDR]);
        Address(addr)
    }

    /// Returns the payload, clamped to the buffer. Only meaningful once
    /// check_encoding(...) passes.
    pub fn payload(&self) -> &[u8] {
        let buffer = self.buffer.as_ref();
        let end = (self.packet_len() as usize).min(buffer.len());
        let start = (self.header_len() as usize).min(end);
        &buffer[start .. end]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_version_and_header_len(&mut self, version: u8, header_len: u8) {
        self.buffer.as_mut()[fields::VERSION_AND_HEADER_LEN] = (version << 4) | (header_len / 4);
    }

    pub fn set_dscp_and_ecn(&mut self, dscp_and_ecn: u8) {
        self.buffer.as_mut()[fields::DSCP_AND_ECN] = dscp_and_ecn;
    }

    pub fn set_packet_len(&mut self, packet_len: u16) {
        (&mut self.buffer.as_mut()[fields::PACKET_LEN])
            .write_u16::<NetworkEndian>(packet_len)
            .unwrap();
    }

    pub fn set_identification(&mut self, id: u16) {
        (&mut self.buffer.as_mut()[fields::IDENTIFICATION])
            .write_u16::<NetworkEndian>(id)
            .unwrap();
    }

    pub fn set_flags_and_fragment_offset(&mut self, value: u16) {
        (&mut self.buffer.as_mut()[fields::FLAGS_AND_FRAGMENT_OFFSET])
            .write_u16::<NetworkEndian>(value)
            .unwrap();
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer.as_mut()[fields::TTL] = ttl;
    }

    pub fn set_protocol(&mut self, protocol: u8) {
        self.buffer.as_mut()[fields::PROTOCOL] = protocol;
    }

    pub fn set_header_checksum(&mut self, checksum: u16) {
        (&mut self.buffer.as_mut()[fields::CHECKSUM])
            .write_u16::<NetworkEndian>(checksum)
            .unwrap();
    }

    pub fn set_src_addr(&mut self, addr: Address) {
        self.buffer.as_mut()[fields::SRC_ADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn set_dst_addr(&mut self, addr: Address) {
        self.buffer.as_mut()[fields::DST_ADDR].copy_from_slice(addr.as_bytes());
    }

    /// Zeroes and then recomputes the header checksum.
    pub fn fill_checksum(&mut self) {
        self.set_header_checksum(0);
        let checksum = self.gen_header_checksum();
        self.set_header_checksum(checksum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> [u8; 20] {
        let mut buffer = [0; 20];
        {
            let mut packet = Packet::try_new(&mut buffer[..]).unwrap();
            Repr {
                src_addr: Address::new([192, 168, 0, 1]),
                dst_addr: Address::new([192, 168, 0, 199]),
                protocol: protocols::UDP,
                payload_len: 0,
            }.serialize(&mut packet);
        }
        buffer
    }

    #[test]
    fn test_packet_buffer_less_than_min_header() {
        let buffer: [u8; 1] = [0; 1];
        assert_matches!(Packet::try_new(&buffer[..]), Err(Error::Exhausted));
    }

    #[test]
    fn test_packet_with_valid_buffer() {
        let buffer: [u8; 36] = [
            0x45, 0x11, 0x00, 0x24, 0xFF, 0xFF, 0x01, 0x01, 0x02, 0x03, 0x00, 0x04, 0x01, 0x02,
            0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_eq!(4, packet.ip_version());
        assert_eq!(20, packet.header_len());
        assert_eq!(4, packet.dscp());
        assert_eq!(1, packet.ecn());
        assert_eq!(36, packet.packet_len());
        assert_eq!(65535, packet.identification());
        assert_eq!(0x0101, packet.flags_and_fragment_offset());
        assert_eq!(2, packet.ttl());
        assert_eq!(3, packet.protocol());
        assert_eq!(4, packet.header_checksum());
        assert_eq!(Address::new([1, 2, 3, 4]), packet.src_addr());
        assert_eq!(Address::new([5, 6, 7, 8]), packet.dst_addr());
    }

    #[test]
    fn test_serialize_fills_header() {
        let buffer = header();
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_eq!(4, packet.ip_version());
        assert_eq!(20, packet.header_len());
        assert_eq!(20, packet.packet_len());
        assert_eq!(255, packet.ttl());
        assert_eq!(flags::DONT_FRAGMENT, packet.flags_and_fragment_offset());
        assert_eq!(protocols::UDP, packet.protocol());
        assert_matches!(packet.check_encoding(), Ok(()));
    }

    #[test]
    fn test_checksum_rejects_any_single_bit_flip() {
        let buffer = header();

        for bit in 0 .. 20 * 8 {
            let mut corrupt = buffer;
            corrupt[bit / 8] ^= 1 << (bit % 8);
            let packet = Packet::try_new(&corrupt[..]).unwrap();
            assert!(
                packet.check_encoding().is_err(),
                "bit {} flipped went undetected",
                bit
            );
        }
    }

    #[test]
    fn test_check_encoding_more_fragments() {
        let mut buffer = header();
        {
            let mut packet = Packet::try_new(&mut buffer[..]).unwrap();
            packet.set_flags_and_fragment_offset(flags::MORE_FRAGMENTS);
            packet.fill_checksum();
        }
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Err(Error::Malformed));
    }

    #[test]
    fn test_check_encoding_header_longer_than_buffer() {
        let mut buffer = header();
        // 0x0F = 15 words = 60 bytes
        buffer[0] = 0x4F;
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Err(Error::Malformed));
    }

    #[test]
    fn test_check_encoding_packet_longer_than_buffer() {
        let mut buffer = header();
        {
            let mut packet = Packet::try_new(&mut buffer[..]).unwrap();
            packet.set_packet_len(40);
            packet.fill_checksum();
        }
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Err(Error::Malformed));
    }

    #[test]
    fn test_check_encoding_accepts_link_padding() {
        let mut buffer = [0; 46];
        buffer[.. 20].copy_from_slice(&header());
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Ok(()));
    }

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "10.0.0.102".parse().unwrap();
        assert_eq!(addr, Address::new([10, 0, 0, 102]));
        assert_eq!(addr.to_string(), "10.0.0.102");
        assert!("10.0.0".parse::<Address>().is_err());
        assert!("10.0.0.256".parse::<Address>().is_err());
        assert!("10.0.0.1.2".parse::<Address>().is_err());
        assert!("10.0..1".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_u32_conversion() {
        let addr = Address::from(0xC0A80001);
        assert_eq!(addr, Address::new([192, 168, 0, 1]));
        assert_eq!(addr.as_u32(), 0xC0A80001);
    }

    #[test]
    fn test_subnet_broadcast() {
        let netmask = Address::new([255, 255, 255, 0]);
        assert!(Address::new([10, 0, 0, 255]).is_subnet_broadcast(netmask));
        assert!(Address::BROADCAST.is_subnet_broadcast(netmask));
        assert!(!Address::new([10, 0, 0, 1]).is_subnet_broadcast(netmask));
        assert!(!Address::new([10, 0, 0, 255]).is_subnet_broadcast(Address::UNSPECIFIED));
        assert!(Address::BROADCAST.is_subnet_broadcast(Address::UNSPECIFIED));
    }
}
