use crate::core::repr::Ipv4Address;
use crate::{
    Error,
    Result,
};

/// Size of the storage behind every packet buffer; fits a full Ethernet frame.
pub const PACKET_BUFFER_LEN: usize = 1536;

/// Headroom left in front of a freshly allocated buffer so each layer can
/// prepend its header without copying.
pub const PACKET_HEADER_RESERVE: usize = 128;

/// Default number of buffers in a pool.
pub const PACKET_POOL_LEN: usize = 64;

/// A fixed size packet buffer with a cursor over the valid bytes.
///
/// The valid bytes start at `index` and span `len` bytes. Headers are
/// prepended by moving the cursor back into the headroom and stripped by
/// moving it forward. Buffers are only created by a `PacketPool` and are not
/// `Clone`, so every buffer has exactly one owner.
#[derive(Debug)]
pub struct PacketBuffer {
    data: Box<[u8]>,
    index: usize,
    len: usize,
    /// Set by the link layer for frames received on the broadcast address.
    pub broadcast: bool,
    /// Set by the IP layer for received packets.
    pub senders_ip: Ipv4Address,
    /// Set by the IP layer for received packets.
    pub target_ip: Ipv4Address,
    /// Set by the UDP layer for received datagrams.
    pub source_port: u16,
}

impl PacketBuffer {
    fn new() -> PacketBuffer {
        PacketBuffer {
            data: vec![0; PACKET_BUFFER_LEN].into_boxed_slice(),
            index: PACKET_HEADER_RESERVE,
            len: 0,
            broadcast: false,
            senders_ip: Ipv4Address::UNSPECIFIED,
            target_ip: Ipv4Address::UNSPECIFIED,
            source_port: 0,
        }
    }

    fn reset(&mut self) {
        self.index = PACKET_HEADER_RESERVE;
        self.len = 0;
        self.broadcast = false;
        self.senders_ip = Ipv4Address::UNSPECIFIED;
        self.target_ip = Ipv4Address::UNSPECIFIED;
        self.source_port = 0;
    }

    /// Returns the valid bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.index .. self.index + self.len]
    }

    /// Returns the valid bytes.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.index .. self.index + self.len]
    }

    /// Returns the number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the offset of the first valid byte.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the number of bytes which can still be prepended.
    pub fn headroom(&self) -> usize {
        self.index
    }

    /// Sets the number of valid bytes starting at the current index.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if self.index + len > self.data.len() {
            return Err(Error::Exhausted);
        }

        self.len = len;
        Ok(())
    }

    /// Shrinks the valid bytes to at most len bytes.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    /// Moves the cursor back by len bytes and returns the new header bytes.
    pub fn push_header(&mut self, len: usize) -> Result<&mut [u8]> {
        if len > self.index {
            return Err(Error::Exhausted);
        }

        self.index -= len;
        self.len += len;
        Ok(&mut self.data[self.index .. self.index + len])
    }

    /// Moves the cursor forward by len bytes, stripping a header.
    pub fn pop_header(&mut self, len: usize) -> Result<()> {
        if len > self.len {
            return Err(Error::Malformed);
        }

        self.index += len;
        self.len -= len;
        Ok(())
    }

    /// Rewinds the cursor to the start of storage and returns the whole
    /// storage for a device to write a received frame into. Follow up with
    /// set_len(...).
    pub fn frame_mut(&mut self) -> &mut [u8] {
        self.index = 0;
        self.len = 0;
        &mut self.data[..]
    }

    /// Replaces the valid bytes with a copy of buffer.
    pub fn copy_from(&mut self, buffer: &[u8]) -> Result<()> {
        self.set_len(buffer.len())?;
        self.payload_mut().copy_from_slice(buffer);
        Ok(())
    }
}

/// A fixed array of packet buffers plus a LIFO free list.
///
/// All buffers are created up front; allocation never touches the heap.
#[derive(Debug)]
pub struct PacketPool {
    free: Vec<PacketBuffer>,
    capacity: usize,
}

impl PacketPool {
    pub fn new(capacity: usize) -> PacketPool {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0 .. capacity {
            free.push(PacketBuffer::new());
        }

        PacketPool { free, capacity }
    }

    /// Takes a buffer off the free list, with the cursor reset to the header
    /// reserve offset and no valid bytes.
    pub fn allocate(&mut self) -> Result<PacketBuffer> {
        match self.free.pop() {
            Some(mut buffer) => {
                buffer.reset();
                Ok(buffer)
            }
            None => {
                debug!("Packet pool exhausted ({} buffers).", self.capacity);
                Err(Error::Exhausted)
            }
        }
    }

    /// Returns a buffer to the head of the free list.
    pub fn free(&mut self, buffer: PacketBuffer) {
        // Capacity was reserved up front so this never reallocates.
        self.free.push(buffer);
    }

    /// Returns the number of buffers owned by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of buffers ready for allocation.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Returns the number of buffers currently owned outside the pool.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.free.len()
    }
}
