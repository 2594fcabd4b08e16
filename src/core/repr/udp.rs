use byteorder::{
    NetworkEndian,
    ReadBytesExt,
    WriteBytesExt,
};

use crate::core::check::internet_checksum;
use crate::core::repr::Ipv4Repr;
use crate::{
    Error,
    Result,
};

/// Safe representation of a UDP header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

impl Repr {
    /// Returns the UDP packet size needed to serialize this UDP header and
    /// payload.
    pub fn buffer_len(&self) -> usize {
        self.length as usize
    }

    /// Deserializes a packet into a UDP header.
    pub fn deserialize<T>(packet: &Packet<T>) -> Repr
    where
        T: AsRef<[u8]>,
    {
        Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            length: packet.length(),
        }
    }

    /// Serializes the UDP header into a packet.
    ///
    /// The payload must be written beforehand for the checksum to be correct.
    pub fn serialize<T>(&self, packet: &mut Packet<T>, ip_repr: &Ipv4Repr)
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_length(self.length);
        packet.set_checksum(0);

        // A zero checksum means "no checksum" on the wire.
        let checksum = match packet.gen_packet_checksum(ip_repr) {
            0 => 0xFFFF,
            checksum => checksum,
        };
        packet.set_checksum(checksum);
    }
}

/// [https://en.wikipedia.org/wiki/User_Datagram_Protocol](https://en.wikipedia.org/wiki/User_Datagram_Protocol)
mod fields {
    use std::ops::{
        Range,
        RangeFrom,
    };

    pub const SRC_PORT: Range<usize> = 0 .. 2;

    pub const DST_PORT: Range<usize> = 2 .. 4;

    pub const LENGTH: Range<usize> = 4 .. 6;

    pub const CHECKSUM: Range<usize> = 6 .. 8;

    pub const PAYLOAD: RangeFrom<usize> = 8 ..;
}

/// View of a byte buffer as a UDP packet.
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
    pub const HEADER_LEN: usize = 8;

    /// Tries to create a UDP packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        let buffer_len = buffer.as_ref().len();

        if buffer_len < Self::HEADER_LEN || buffer_len > u16::max_value() as usize {
            Err(Error::Malformed)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of a UDP packet with the specified payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    /// Checks if the packet has a valid encoding.
    ///
    /// The checksum is optional for IPv4 and only verified when nonzero.
    pub fn check_encoding(&self, ip_repr: &Ipv4Repr) -> Result<()> {
        if (self.length() as usize) < Self::HEADER_LEN
            || self.length() as usize > self.buffer.as_ref().len()
        {
            Err(Error::Malformed)
        } else if self.checksum() != 0 && self.gen_packet_checksum(ip_repr) != 0 {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    /// Calculates the packet checksum over the IPv4 pseudo header and the
    /// datagram.
    pub fn gen_packet_checksum(&self, ip_repr: &Ipv4Repr) -> u16 {
        let mut ip_pseudo_header = [0; 12];
        (&mut ip_pseudo_header[0 .. 4]).copy_from_slice(ip_repr.src_addr.as_bytes());
        (&mut ip_pseudo_header[4 .. 8]).copy_from_slice(ip_repr.dst_addr.as_bytes());
        ip_pseudo_header[9] = ip_repr.protocol;
        (&mut ip_pseudo_header[10 .. 12])
            .write_u16::<NetworkEndian>(ip_repr.payload_len)
            .unwrap();

        let datagram_len = (ip_repr.payload_len as usize).min(self.buffer.as_ref().len());
        let iter = ip_pseudo_header
            .iter()
            .chain(self.buffer.as_ref()[.. datagram_len].iter())
            .cloned();
        internet_checksum(iter)
    }

    pub fn src_port(&self) -> u16 {
        (&self.buffer.as_ref()[fields::SRC_PORT])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn dst_port(&self) -> u16 {
        (&self.buffer.as_ref()[fields::DST_PORT])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn length(&self) -> u16 {
        (&self.buffer.as_ref()[fields::LENGTH])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn checksum(&self) -> u16 {
        (&self.buffer.as_ref()[fields::CHECKSUM])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_src_port(&mut self, port: u16) {
        (&mut self.buffer.as_mut()[fields::SRC_PORT])
            .write_u16::<NetworkEndian>(port)
            .unwrap()
    }

    pub fn set_dst_port(&mut self, port: u16) {
        (&mut self.buffer.as_mut()[fields::DST_PORT])
            .write_u16::<NetworkEndian>(port)
            .unwrap()
    }

    pub fn set_length(&mut self, length: u16) {
        (&mut self.buffer.as_mut()[fields::LENGTH])
            .write_u16::<NetworkEndian>(length)
            .unwrap()
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        (&mut self.buffer.as_mut()[fields::CHECKSUM])
            .write_u16::<NetworkEndian>(checksum)
            .unwrap()
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::PAYLOAD]
    }
}
