//! Application protocol clients running on top of an `Interface`.
//!
//! Clients are polled state machines. They own no buffers between polls and
//! never block, so any number of them can share one interface.

pub mod dhcp;
pub mod tftp;

pub use self::dhcp::{
    DhcpClient,
    State as DhcpState,
};
pub use self::tftp::{
    State as TftpState,
    TftpConnection,
};
