//! Helpers shared by the demo programs.

pub mod env;
pub mod tftp;

pub use self::tftp::tftp_get;
