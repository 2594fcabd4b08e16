use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::rc::Rc;

use crate::core::repr::EthernetAddress;
use crate::{
    Error,
    Result,
};

/// A device for sending and receiving raw Ethernet frames.
///
/// Devices copy frames in and out of caller provided buffers, so the stack
/// keeps ownership of its packet buffers throughout.
pub trait Device: Debug {
    /// Brings the device up.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Programs the Ethernet address the device should receive frames for.
    fn set_ethernet_addr(&mut self, _eth_addr: EthernetAddress) {}

    /// Sends a single Ethernet frame.
    ///
    /// Returns Error::Busy if the device is temporarily unable to transmit.
    fn send(&mut self, buffer: &[u8]) -> Result<()>;

    /// Copies a received Ethernet frame into buffer, returning the frame size.
    ///
    /// This never blocks. Returns Error::Exhausted if no frame is ready.
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the maximum Ethernet frame size, header included, the device
    /// can send.
    fn max_transmission_unit(&self) -> usize;
}

#[derive(Debug, Default)]
struct MockQueues {
    rx: VecDeque<Vec<u8>>,
    tx: VecDeque<Vec<u8>>,
    eth_addr: Option<EthernetAddress>,
    busy: bool,
}

/// An in memory device for driving a stack from tests.
///
/// Clones share the same queues, so a test can keep a handle to inject
/// received frames and inspect sent ones after handing a clone to a stack.
#[derive(Clone, Debug, Default)]
pub struct MockDevice {
    queues: Rc<RefCell<MockQueues>>,
}

impl MockDevice {
    pub const MAX_TRANSMISSION_UNIT: usize = 1514;

    pub fn new() -> MockDevice {
        MockDevice::default()
    }

    /// Queues a frame for the stack to receive.
    pub fn push_rx(&self, frame: Vec<u8>) {
        self.queues.borrow_mut().rx.push_back(frame);
    }

    /// Returns the number of frames the stack has yet to receive.
    pub fn rx_len(&self) -> usize {
        self.queues.borrow().rx.len()
    }

    /// Takes the oldest frame the stack sent.
    pub fn pop_tx(&self) -> Option<Vec<u8>> {
        self.queues.borrow_mut().tx.pop_front()
    }

    /// Takes every frame the stack sent, oldest first.
    pub fn drain_tx(&self) -> Vec<Vec<u8>> {
        self.queues.borrow_mut().tx.drain(..).collect()
    }

    /// Returns the number of frames the stack sent which have not been taken.
    pub fn tx_len(&self) -> usize {
        self.queues.borrow().tx.len()
    }

    /// Makes every send fail with Error::Busy until cleared.
    pub fn set_busy(&self, busy: bool) {
        self.queues.borrow_mut().busy = busy;
    }

    /// Returns the Ethernet address last programmed by the stack.
    pub fn ethernet_addr(&self) -> Option<EthernetAddress> {
        self.queues.borrow().eth_addr
    }
}

impl Device for MockDevice {
    fn set_ethernet_addr(&mut self, eth_addr: EthernetAddress) {
        self.queues.borrow_mut().eth_addr = Some(eth_addr);
    }

    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        let mut queues = self.queues.borrow_mut();
        if queues.busy {
            return Err(Error::Busy);
        }
        if buffer.len() > Self::MAX_TRANSMISSION_UNIT {
            return Err(Error::Exhausted);
        }

        queues.tx.push_back(buffer.to_vec());
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut queues = self.queues.borrow_mut();
        let frame = queues.rx.pop_front().ok_or(Error::Exhausted)?;
        if frame.len() > buffer.len() {
            debug!("Dropping oversized frame of {} bytes.", frame.len());
            return Err(Error::Malformed);
        }

        buffer[.. frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    fn max_transmission_unit(&self) -> usize {
        Self::MAX_TRANSMISSION_UNIT
    }
}
