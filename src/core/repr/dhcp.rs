use byteorder::{
    NetworkEndian,
    ReadBytesExt,
    WriteBytesExt,
};

use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use crate::{
    Error,
    Result,
};

pub const SERVER_PORT: u16 = 67;

pub const CLIENT_PORT: u16 = 68;

/// Magic cookie separating the fixed header from the options.
pub const MAGIC_COOKIE: u32 = 0x6382_5363;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Request = 1,
    Reply = 2,
}

/// https://www.iana.org/assignments/bootp-dhcp-parameters/bootp-dhcp-parameters.xhtml#message-type-53
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    fn try_from_u8(value: u8) -> Result<MessageType> {
        match value {
            1 => Ok(MessageType::Discover),
            2 => Ok(MessageType::Offer),
            3 => Ok(MessageType::Request),
            4 => Ok(MessageType::Decline),
            5 => Ok(MessageType::Ack),
            6 => Ok(MessageType::Nak),
            7 => Ok(MessageType::Release),
            8 => Ok(MessageType::Inform),
            _ => Err(Error::Malformed),
        }
    }
}

/// https://www.iana.org/assignments/bootp-dhcp-parameters/bootp-dhcp-parameters.xhtml#options
pub mod options {
    pub const PAD: u8 = 0;

    pub const SUBNET_MASK: u8 = 1;

    pub const REQUESTED_IP: u8 = 50;

    pub const LEASE_TIME: u8 = 51;

    pub const MESSAGE_TYPE: u8 = 53;

    pub const SERVER_ID: u8 = 54;

    pub const END: u8 = 255;
}

/// [https://tools.ietf.org/html/rfc2131#section-2](https://tools.ietf.org/html/rfc2131#section-2)
mod fields {
    use std::ops::{
        Range,
        RangeFrom,
    };

    pub const OP: usize = 0;

    pub const HW_TYPE: usize = 1;

    pub const HW_LEN: usize = 2;

    pub const HOPS: usize = 3;

    pub const TRANSACTION_ID: Range<usize> = 4 .. 8;

    pub const SECS: Range<usize> = 8 .. 10;

    pub const FLAGS: Range<usize> = 10 .. 12;

    pub const CLIENT_IP: Range<usize> = 12 .. 16;

    pub const YOUR_IP: Range<usize> = 16 .. 20;

    pub const SERVER_IP: Range<usize> = 20 .. 24;

    pub const RELAY_IP: Range<usize> = 24 .. 28;

    pub const CLIENT_HW_ADDR: Range<usize> = 28 .. 34;

    pub const CLIENT_HW_ADDR_PADDING: Range<usize> = 34 .. 44;

    pub const SERVER_NAME: Range<usize> = 44 .. 108;

    pub const BOOT_FILE: Range<usize> = 108 .. 236;

    pub const MAGIC_COOKIE: Range<usize> = 236 .. 240;

    pub const OPTIONS: RangeFrom<usize> = 240 ..;
}

/// View of a byte buffer as a DHCP packet.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Length of the fixed header plus the magic cookie.
    pub const HEADER_LEN: usize = 240;

    /// Tries to create a DHCP packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN {
            Err(Error::Malformed)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Checks the hardware type/length and magic cookie.
    pub fn check_encoding(&self) -> Result<()> {
        if self.hw_type() != 1 || self.hw_len() != 6 || self.magic_cookie() != MAGIC_COOKIE {
            Err(Error::Malformed)
        } else {
            Ok(())
        }
    }

    pub fn op(&self) -> u8 {
        self.buffer.as_ref()[fields::OP]
    }

    pub fn hw_type(&self) -> u8 {
        self.buffer.as_ref()[fields::HW_TYPE]
    }

    pub fn hw_len(&self) -> u8 {
        self.buffer.as_ref()[fields::HW_LEN]
    }

    pub fn transaction_id(&self) -> u32 {
        (&self.buffer.as_ref()[fields::TRANSACTION_ID])
            .read_u32::<NetworkEndian>()
            .unwrap()
    }

    pub fn secs(&self) -> u16 {
        (&self.buffer.as_ref()[fields::SECS])
            .read_u16::<NetworkEndian>()
            .unwrap()
    }

    pub fn client_ip(&self) -> Ipv4Address {
        self.ipv4_addr(fields::CLIENT_IP.start)
    }

    pub fn your_ip(&self) -> Ipv4Address {
        self.ipv4_addr(fields::YOUR_IP.start)
    }

    pub fn client_hw_addr(&self) -> EthernetAddress {
        let mut addr = [0; 6];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::CLIENT_HW_ADDR]);
        EthernetAddress::new(addr)
    }

    pub fn magic_cookie(&self) -> u32 {
        (&self.buffer.as_ref()[fields::MAGIC_COOKIE])
            .read_u32::<NetworkEndian>()
            .unwrap()
    }

    pub fn options(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::OPTIONS]
    }

    fn ipv4_addr(&self, offset: usize) -> Ipv4Address {
        let mut addr = [0; 4];
        addr.copy_from_slice(&self.buffer.as_ref()[offset .. offset + 4]);
        Ipv4Address::new(addr)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_op(&mut self, op: OpCode) {
        self.buffer.as_mut()[fields::OP] = op as u8;
    }

    /// Sets up an Ethernet hardware type/length with no relay hops.
    pub fn set_ethernet_hw(&mut self) {
        self.buffer.as_mut()[fields::HW_TYPE] = 1;
        self.buffer.as_mut()[fields::HW_LEN] = 6;
        self.buffer.as_mut()[fields::HOPS] = 0;
    }

    pub fn set_transaction_id(&mut self, transaction_id: u32) {
        (&mut self.buffer.as_mut()[fields::TRANSACTION_ID])
            .write_u32::<NetworkEndian>(transaction_id)
            .unwrap();
    }

    pub fn set_secs(&mut self, secs: u16) {
        (&mut self.buffer.as_mut()[fields::SECS])
            .write_u16::<NetworkEndian>(secs)
            .unwrap();
    }

    pub fn set_flags(&mut self, flags: u16) {
        (&mut self.buffer.as_mut()[fields::FLAGS])
            .write_u16::<NetworkEndian>(flags)
            .unwrap();
    }

    pub fn set_client_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::CLIENT_IP].copy_from_slice(addr.as_bytes());
    }

    pub fn set_your_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::YOUR_IP].copy_from_slice(addr.as_bytes());
    }

    pub fn set_server_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::SERVER_IP].copy_from_slice(addr.as_bytes());
    }

    pub fn set_relay_ip(&mut self, addr: Ipv4Address) {
        self.buffer.as_mut()[fields::RELAY_IP].copy_from_slice(addr.as_bytes());
    }

    /// Sets the client hardware address, zeroing the unused remainder of the
    /// field.
    pub fn set_client_hw_addr(&mut self, addr: EthernetAddress) {
        self.buffer.as_mut()[fields::CLIENT_HW_ADDR].copy_from_slice(addr.as_bytes());
        for byte in self.buffer.as_mut()[fields::CLIENT_HW_ADDR_PADDING].iter_mut() {
            *byte = 0;
        }
    }

    /// Zeroes the legacy BOOTP server name and boot file fields.
    pub fn clear_boot_fields(&mut self) {
        for byte in self.buffer.as_mut()[fields::SERVER_NAME.start .. fields::BOOT_FILE.end].iter_mut() {
            *byte = 0;
        }
    }

    pub fn set_magic_cookie(&mut self, cookie: u32) {
        (&mut self.buffer.as_mut()[fields::MAGIC_COOKIE])
            .write_u32::<NetworkEndian>(cookie)
            .unwrap();
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::OPTIONS]
    }
}

/// Safe representation of a DHCP message and the options this client
/// understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repr {
    pub op: OpCode,
    pub transaction_id: u32,
    pub secs: u16,
    pub client_ip: Ipv4Address,
    pub your_ip: Ipv4Address,
    pub client_hw_addr: EthernetAddress,
    pub message_type: MessageType,
    pub requested_ip: Option<Ipv4Address>,
    pub server_id: Option<Ipv4Address>,
    pub netmask: Option<Ipv4Address>,
    /// Lease time in seconds.
    pub lease_time: Option<u32>,
}

impl Repr {
    /// Creates a client request with no options besides the message type.
    pub fn request(
        message_type: MessageType,
        transaction_id: u32,
        client_hw_addr: EthernetAddress,
    ) -> Repr {
        Repr {
            op: OpCode::Request,
            transaction_id,
            secs: 0,
            client_ip: Ipv4Address::UNSPECIFIED,
            your_ip: Ipv4Address::UNSPECIFIED,
            client_hw_addr,
            message_type,
            requested_ip: None,
            server_id: None,
            netmask: None,
            lease_time: None,
        }
    }

    /// Returns the size of the DHCP message when serialized to a buffer.
    pub fn buffer_len(&self) -> usize {
        let ip_options = [self.requested_ip, self.server_id, self.netmask]
            .iter()
            .filter(|option| option.is_some())
            .count();
        let lease_time = if self.lease_time.is_some() { 6 } else { 0 };

        // message type + addresses + lease time + end
        Packet::<&[u8]>::HEADER_LEN + 3 + 6 * ip_options + lease_time + 1
    }

    /// Tries to parse a DHCP message.
    ///
    /// Options are a sequence of type/length/value triples terminated by an
    /// END marker, with PAD bytes allowed between them. Unknown options are
    /// skipped. A message without a message type option is malformed.
    pub fn parse<T>(packet: &Packet<T>) -> Result<Repr>
    where
        T: AsRef<[u8]>,
    {
        packet.check_encoding()?;

        let op = match packet.op() {
            1 => OpCode::Request,
            2 => OpCode::Reply,
            _ => return Err(Error::Malformed),
        };

        let mut message_type = None;
        let mut requested_ip = None;
        let mut server_id = None;
        let mut netmask = None;
        let mut lease_time = None;

        let mut data = packet.options();
        loop {
            let (&kind, rest) = data.split_first().ok_or(Error::Malformed)?;
            match kind {
                options::END => break,
                options::PAD => {
                    data = rest;
                    continue;
                }
                _ => {}
            }

            let (&len, rest) = rest.split_first().ok_or(Error::Malformed)?;
            let len = len as usize;
            if len > rest.len() {
                return Err(Error::Malformed);
            }
            let (value, rest) = rest.split_at(len);

            match kind {
                options::MESSAGE_TYPE => {
                    if len != 1 {
                        return Err(Error::Malformed);
                    }
                    message_type = Some(MessageType::try_from_u8(value[0])?);
                }
                options::SUBNET_MASK => netmask = Some(ipv4_option(value)?),
                options::REQUESTED_IP => requested_ip = Some(ipv4_option(value)?),
                options::SERVER_ID => server_id = Some(ipv4_option(value)?),
                options::LEASE_TIME => {
                    if len != 4 {
                        return Err(Error::Malformed);
                    }
                    lease_time = Some((&value[..]).read_u32::<NetworkEndian>()?);
                }
                _ => {}
            }

            data = rest;
        }

        Ok(Repr {
            op,
            transaction_id: packet.transaction_id(),
            secs: packet.secs(),
            client_ip: packet.client_ip(),
            your_ip: packet.your_ip(),
            client_hw_addr: packet.client_hw_addr(),
            message_type: message_type.ok_or(Error::Malformed)?,
            requested_ip,
            server_id,
            netmask,
            lease_time,
        })
    }

    /// Serializes the DHCP message into a buffer of at least buffer_len()
    /// bytes.
    pub fn emit<T>(&self, packet: &mut Packet<T>) -> Result<()>
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        if packet.buffer.as_ref().len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }

        packet.set_op(self.op);
        packet.set_ethernet_hw();
        packet.set_transaction_id(self.transaction_id);
        packet.set_secs(self.secs);
        packet.set_flags(0);
        packet.set_client_ip(self.client_ip);
        packet.set_your_ip(self.your_ip);
        packet.set_server_ip(Ipv4Address::UNSPECIFIED);
        packet.set_relay_ip(Ipv4Address::UNSPECIFIED);
        packet.set_client_hw_addr(self.client_hw_addr);
        packet.clear_boot_fields();
        packet.set_magic_cookie(MAGIC_COOKIE);

        let data = packet.options_mut();
        data[0] = options::MESSAGE_TYPE;
        data[1] = 1;
        data[2] = self.message_type as u8;
        let mut i = 3;

        let ip_options = [
            (options::REQUESTED_IP, self.requested_ip),
            (options::SERVER_ID, self.server_id),
            (options::SUBNET_MASK, self.netmask),
        ];
        for &(kind, addr) in ip_options.iter() {
            if let Some(addr) = addr {
                data[i] = kind;
                data[i + 1] = 4;
                data[i + 2 .. i + 6].copy_from_slice(addr.as_bytes());
                i += 6;
            }
        }

        if let Some(lease_time) = self.lease_time {
            data[i] = options::LEASE_TIME;
            data[i + 1] = 4;
            (&mut data[i + 2 .. i + 6]).write_u32::<NetworkEndian>(lease_time)?;
            i += 6;
        }

        data[i] = options::END;

        Ok(())
    }
}

fn ipv4_option(value: &[u8]) -> Result<Ipv4Address> {
    Ipv4Address::try_new(value).map_err(|_| Error::Malformed)
}
