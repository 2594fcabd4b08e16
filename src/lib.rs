#[cfg(test)]
#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod core;
pub mod demos;

#[cfg(target_os = "linux")]
pub mod linux;

use std::fmt::{
    Display,
    Formatter,
    Result as FmtResult,
};

#[derive(Debug)]
pub enum Error {
    /// Indicates an error where a buffer, pool, queue, etc. is full or empty.
    Exhausted,
    /// Indicates an error where a packet or frame is malformed.
    Malformed,
    /// Indicates an error where a checksum is invalid.
    Checksum,
    /// Indicates a packet which was well formed but not addressed to us.
    Ignored,
    /// Indicates a device which is temporarily unable to transmit.
    Busy,
    /// Indicates a generic IO error.
    IO(std::io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match *self {
            Error::Exhausted => write!(f, "resource exhausted"),
            Error::Malformed => write!(f, "malformed packet"),
            Error::Checksum => write!(f, "invalid checksum"),
            Error::Ignored => write!(f, "packet ignored"),
            Error::Busy => write!(f, "device busy"),
            Error::IO(ref err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
