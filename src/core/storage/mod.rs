//! Fixed capacity storage for packets.

pub mod pool;
pub mod ring;

pub use self::pool::{
    PacketBuffer,
    PacketPool,
    PACKET_BUFFER_LEN,
    PACKET_HEADER_RESERVE,
    PACKET_POOL_LEN,
};
pub use self::ring::Ring;
