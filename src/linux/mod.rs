//! Linux specific devices.

pub mod dev;
mod libc;

pub use self::dev::Tap;
