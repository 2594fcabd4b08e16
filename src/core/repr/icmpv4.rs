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

/// Safe representation of an ICMP header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repr {
    EchoReply { id: u16, seq: u16 },
    EchoRequest { id: u16, seq: u16 },
}

/// https://www.iana.org/assignments/icmp-parameters/icmp-parameters.xhtml#icmp-parameters-types
pub mod types {
    pub const ECHO_REPLY: u8 = 0;

    pub const ECHO_REQUEST: u8 = 8;
}

impl Repr {
    /// Returns the size of the ICMP header described by this representation.
    pub fn buffer_len(&self) -> usize {
        Packet::<&[u8]>::HEADER_LEN
    }

    /// Tries to deserialize a packet into an ICMP representation.
    ///
    /// Only echo messages are understood, anything else is ignored.
    pub fn deserialize<T>(packet: &Packet<T>) -> Result<Repr>
    where
        T: AsRef<[u8]>,
    {
        let id = (&packet.header()[0 .. 2]).read_u16::<NetworkEndian>()?;
        let seq = (&packet.header()[2 .. 4]).read_u16::<NetworkEndian>()?;

        match (packet._type(), packet.code()) {
            (types::ECHO_REPLY, 0) => Ok(Repr::EchoReply { id, seq }),
            (types::ECHO_REQUEST, 0) => Ok(Repr::EchoRequest { id, seq }),
            _ => Err(Error::Ignored),
        }
    }

    /// Serializes the ICMP representation into a packet and fills in the
    /// checksum. Any payload must be written beforehand.
    pub fn serialize<T>(&self, packet: &mut Packet<T>)
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        let (type_of, id, seq) = match *self {
            Repr::EchoReply { id, seq } => (types::ECHO_REPLY, id, seq),
            Repr::EchoRequest { id, seq } => (types::ECHO_REQUEST, id, seq),
        };

        packet.set_type(type_of);
        packet.set_code(0);
        (&mut packet.header_mut()[0 .. 2])
            .write_u16::<NetworkEndian>(id)
            .unwrap();
        (&mut packet.header_mut()[2 .. 4])
            .write_u16::<NetworkEndian>(seq)
            .unwrap();
        packet.fill_checksum();
    }
}

/// [https://en.wikipedia.org/wiki/Internet_Control_Message_Protocol](https://en.wikipedia.org/wiki/Internet_Control_Message_Protocol)
mod fields {
    use std::ops::{
        Range,
        RangeFrom,
    };

    pub const TYPE: usize = 0;

    pub const CODE: usize = 1;

    pub const CHECKSUM: Range<usize> = 2 .. 4;

    pub const HEADER: Range<usize> = 4 .. 8;

    pub const PAYLOAD: RangeFrom<usize> = 8 ..;
}

/// View of a byte buffer as an ICMP packet.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const HEADER_LEN: usize = 8;

    /// Tries to create an ICMP packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN {
            Err(Error::Malformed)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of an ICMP packet with the specified payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    /// Checks if the checksum over the whole packet is valid.
    pub fn check_encoding(&self) -> Result<()> {
        if self.gen_packet_checksum() != 0 {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    /// Calculates the packet checksum.
    pub fn gen_packet_checksum(&self) -> u16 {
        internet_checksum(self.buffer.as_ref().iter().cloned())
    }

    pub fn _type(&self) -> u8 {
        self.buffer.as_ref()[fields::TYPE]
    }

    pub fn code(&self) -> u8 {
        self.buffer.as_ref()[fields::CODE]
    }

    pub fn checksum(&self) -> u16 {
        (&self.buffer.as_ref()[fields::CHECKSUM])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn header(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::HEADER]
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_type(&mut self, type_of: u8) {
        self.buffer.as_mut()[fields::TYPE] = type_of
    }

    pub fn set_code(&mut self, code: u8) {
        self.buffer.as_mut()[fields::CODE] = code;
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        (&mut self.buffer.as_mut()[fields::CHECKSUM])
            .write_u16::<NetworkEndian>(checksum)
            .unwrap()
    }

    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::HEADER]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::PAYLOAD]
    }

    /// Zeroes and then recomputes the checksum over the whole packet.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = self.gen_packet_checksum();
        self.set_checksum(checksum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_buffer_too_small() {
        let buffer: [u8; 7] = [0; 7];
        assert_matches!(Packet::try_new(&buffer[..]), Err(Error::Malformed));
    }

    #[test]
    fn test_packet_with_invalid_checksum() {
        let buffer: [u8; 9] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Err(Error::Checksum));
    }

    #[test]
    fn test_packet_getters() {
        let buffer: [u8; 9] = [0x01, 0x02, 0xE9, 0xEF, 0x05, 0x06, 0x07, 0x08, 0x09];
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Ok(_));
        assert_eq!(packet._type(), 1);
        assert_eq!(packet.code(), 2);
        assert_eq!(packet.checksum(), 59887);
        assert_eq!(packet.header(), [0x05, 0x06, 0x07, 0x08]);
        assert_eq!(packet.payload(), [0x09]);
    }

    #[test]
    fn test_echo_serialize_then_verify() {
        let mut buffer = [0; 12];
        {
            let mut packet = Packet::try_new(&mut buffer[..]).unwrap();
            packet.payload_mut().copy_from_slice(b"ping");
            Repr::EchoRequest { id: 42, seq: 7 }.serialize(&mut packet);
        }

        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Ok(()));
        assert_eq!(
            Repr::deserialize(&packet).unwrap(),
            Repr::EchoRequest { id: 42, seq: 7 }
        );
    }

    #[test]
    fn test_deserialize_ignores_other_types() {
        // Destination unreachable.
        let buffer: [u8; 8] = [3, 3, 0, 0, 0, 0, 0, 0];
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(Repr::deserialize(&packet), Err(Error::Ignored));
    }
}
