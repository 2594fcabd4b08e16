use crate::{
    Error,
    Result,
};

/// Ring/bounded FIFO buffer of T's.
///
/// Storage is reserved up front, so enqueueing and dequeueing never allocate.
#[derive(Debug)]
pub struct Ring<T> {
    buffer: Vec<Option<T>>,
    begin: usize,
    len: usize,
}

impl<T> Ring<T> {
    /// Creates an empty ring which holds at most capacity items.
    pub fn with_capacity(capacity: usize) -> Ring<T> {
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, || None);
        Ring {
            buffer,
            begin: 0,
            len: 0,
        }
    }

    /// Removes the item at the head of the ring or returns an error if the
    /// ring is empty.
    pub fn dequeue(&mut self) -> Result<T> {
        if self.len == 0 {
            return Err(Error::Exhausted);
        }

        let item = self.buffer[self.begin].take();
        self.begin = (self.begin + 1) % self.buffer.len();
        self.len -= 1;
        item.ok_or(Error::Exhausted)
    }

    /// Appends an item to the tail of the ring, handing the item back if the
    /// ring is full.
    pub fn enqueue(&mut self, item: T) -> std::result::Result<(), T> {
        if self.len == self.buffer.len() {
            return Err(item);
        }

        let idx = (self.begin + self.len) % self.buffer.len();
        self.buffer[idx] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Appends an item to the tail of the ring, making room by evicting the
    /// head if the ring is full.
    ///
    /// # Returns
    ///
    /// The evicted item, if any. With a zero capacity ring this is the item
    /// itself.
    pub fn enqueue_evicting(&mut self, item: T) -> Option<T> {
        if self.buffer.is_empty() {
            return Some(item);
        }

        let evicted = if self.len == self.buffer.len() {
            self.dequeue().ok()
        } else {
            None
        };

        match self.enqueue(item) {
            Ok(()) => evicted,
            Err(item) => Some(item),
        }
    }

    /// Returns the current number of items in the ring.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the maximum number of items in the ring.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}
