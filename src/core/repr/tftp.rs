use std::io::{
    Cursor,
    Write,
};
use std::str;

use byteorder::{
    NetworkEndian,
    ReadBytesExt,
    WriteBytesExt,
};

use crate::{
    Error,
    Result,
};

/// Well known port for read/write requests.
pub const SERVER_PORT: u16 = 69;

/// Size of a full DATA block, the only block size this client negotiates.
pub const BLOCK_SIZE: usize = 512;

/// [https://tools.ietf.org/html/rfc1350#section-5](https://tools.ietf.org/html/rfc1350#section-5)
pub mod opcodes {
    pub const READ_REQUEST: u16 = 1;

    pub const WRITE_REQUEST: u16 = 2;

    pub const DATA: u16 = 3;

    pub const ACK: u16 = 4;

    pub const ERROR: u16 = 5;

    pub const OPTION_ACK: u16 = 6;
}

/// [https://tools.ietf.org/html/rfc1350#page-10](https://tools.ietf.org/html/rfc1350#page-10)
pub mod error_codes {
    pub const NOT_DEFINED: u16 = 0;

    pub const FILE_NOT_FOUND: u16 = 1;

    pub const ACCESS_VIOLATION: u16 = 2;

    pub const DISK_FULL: u16 = 3;

    pub const ILLEGAL_OPERATION: u16 = 4;

    pub const UNKNOWN_TID: u16 = 5;

    pub const FILE_ALREADY_EXISTS: u16 = 6;

    pub const NO_SUCH_USER: u16 = 7;

    pub const OPTION_NEGOTIATION: u16 = 8;
}

const MODE_OCTET: &str = "octet";

const OPTION_BLKSIZE: &str = "blksize";

/// Safe representation of a TFTP packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repr<'a> {
    /// A binary ("octet" mode) read request, optionally negotiating a block
    /// size per RFC 2348.
    ReadRequest {
        filename: &'a str,
        block_size: Option<u16>,
    },
    Data {
        block: u16,
        data: &'a [u8],
    },
    Ack {
        block: u16,
    },
    Error {
        code: u16,
        message: &'a str,
    },
    /// An option acknowledgement per RFC 2347. Options other than the block
    /// size are not understood and left out.
    OptionAck {
        block_size: Option<u16>,
    },
}

impl<'a> Repr<'a> {
    /// Returns the size of the TFTP packet when serialized to a buffer.
    pub fn buffer_len(&self) -> usize {
        2 + match *self {
            Repr::ReadRequest {
                filename,
                block_size,
            } => {
                filename.len() + 1 + MODE_OCTET.len() + 1 + block_size.map_or(0, option_len)
            }
            Repr::Data { data, .. } => 2 + data.len(),
            Repr::Ack { .. } => 2,
            Repr::Error { message, .. } => 2 + message.len() + 1,
            Repr::OptionAck { block_size } => block_size.map_or(0, option_len),
        }
    }

    /// Tries to parse a TFTP packet.
    pub fn parse(buffer: &'a [u8]) -> Result<Repr<'a>> {
        if buffer.len() < 2 {
            return Err(Error::Malformed);
        }

        let opcode = (&buffer[0 .. 2]).read_u16::<NetworkEndian>()?;
        let body = &buffer[2 ..];

        match opcode {
            opcodes::READ_REQUEST => {
                let mut strings = Strings { buffer: body };
                let filename = strings.next_str()?;
                let mode = strings.next_str()?;
                if !mode.eq_ignore_ascii_case(MODE_OCTET) {
                    return Err(Error::Malformed);
                }
                Ok(Repr::ReadRequest {
                    filename,
                    block_size: parse_options(strings)?,
                })
            }
            opcodes::DATA => {
                if body.len() < 2 {
                    return Err(Error::Malformed);
                }
                Ok(Repr::Data {
                    block: (&body[0 .. 2]).read_u16::<NetworkEndian>()?,
                    data: &body[2 ..],
                })
            }
            opcodes::ACK => {
                if body.len() < 2 {
                    return Err(Error::Malformed);
                }
                Ok(Repr::Ack {
                    block: (&body[0 .. 2]).read_u16::<NetworkEndian>()?,
                })
            }
            opcodes::ERROR => {
                if body.len() < 2 {
                    return Err(Error::Malformed);
                }
                let code = (&body[0 .. 2]).read_u16::<NetworkEndian>()?;
                let mut strings = Strings { buffer: &body[2 ..] };
                Ok(Repr::Error {
                    code,
                    message: strings.next_str()?,
                })
            }
            opcodes::OPTION_ACK => Ok(Repr::OptionAck {
                block_size: parse_options(Strings { buffer: body })?,
            }),
            _ => Err(Error::Malformed),
        }
    }

    /// Serializes the TFTP packet into a buffer, returning the number of bytes
    /// written.
    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let buffer_len = self.buffer_len();
        if buffer_len > buffer.len() {
            return Err(Error::Exhausted);
        }

        let mut writer = Cursor::new(&mut buffer[.. buffer_len]);
        match *self {
            Repr::ReadRequest {
                filename,
                block_size,
            } => {
                writer.write_u16::<NetworkEndian>(opcodes::READ_REQUEST)?;
                write_str(&mut writer, filename)?;
                write_str(&mut writer, MODE_OCTET)?;
                if let Some(block_size) = block_size {
                    write_str(&mut writer, OPTION_BLKSIZE)?;
                    write_str(&mut writer, &block_size.to_string())?;
                }
            }
            Repr::Data { block, data } => {
                writer.write_u16::<NetworkEndian>(opcodes::DATA)?;
                writer.write_u16::<NetworkEndian>(block)?;
                writer.write_all(data)?;
            }
            Repr::Ack { block } => {
                writer.write_u16::<NetworkEndian>(opcodes::ACK)?;
                writer.write_u16::<NetworkEndian>(block)?;
            }
            Repr::Error { code, message } => {
                writer.write_u16::<NetworkEndian>(opcodes::ERROR)?;
                writer.write_u16::<NetworkEndian>(code)?;
                write_str(&mut writer, message)?;
            }
            Repr::OptionAck { block_size } => {
                writer.write_u16::<NetworkEndian>(opcodes::OPTION_ACK)?;
                if let Some(block_size) = block_size {
                    write_str(&mut writer, OPTION_BLKSIZE)?;
                    write_str(&mut writer, &block_size.to_string())?;
                }
            }
        }

        Ok(buffer_len)
    }
}

/// Length of an encoded "blksize" option name/value pair.
fn option_len(block_size: u16) -> usize {
    OPTION_BLKSIZE.len() + 1 + block_size.to_string().len() + 1
}

fn write_str<W: Write>(writer: &mut W, string: &str) -> Result<()> {
    writer.write_all(string.as_bytes())?;
    writer.write_u8(0)?;
    Ok(())
}

/// Splits a buffer into NUL terminated strings.
struct Strings<'a> {
    buffer: &'a [u8],
}

impl<'a> Strings<'a> {
    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn next_str(&mut self) -> Result<&'a str> {
        let end = self
            .buffer
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(Error::Malformed)?;
        let string = str::from_utf8(&self.buffer[.. end]).map_err(|_| Error::Malformed)?;
        self.buffer = &self.buffer[end + 1 ..];
        Ok(string)
    }
}

/// Parses name/value option pairs, returning the block size if negotiated.
fn parse_options(mut strings: Strings) -> Result<Option<u16>> {
    let mut block_size = None;

    while !strings.is_empty() {
        let name = strings.next_str()?;
        let value = strings.next_str()?;
        if name.eq_ignore_ascii_case(OPTION_BLKSIZE) {
            block_size = Some(value.parse::<u16>().map_err(|_| Error::Malformed)?);
        }
    }

    Ok(block_size)
}
