use crate::core::client::DhcpClient;
use crate::core::service::{
    arp,
    ethernet,
    Interface,
};
use crate::Error;
use crate::Result;

/// Maximum number of frames received in one call to `Stack::poll()`.
pub const RX_BURST: usize = 32;

/// The top level object: an `Interface` plus the DHCP client configuring it.
///
/// Everything runs from `poll()`, which should be called periodically.
#[derive(Debug)]
pub struct Stack {
    pub interface: Interface,
    pub dhcp: DhcpClient,
}

impl Stack {
    pub fn new(interface: Interface) -> Stack {
        Stack {
            interface,
            dhcp: DhcpClient::new(),
        }
    }

    /// Brings the device up with our MAC address.
    pub fn init(&mut self) -> Result<()> {
        self.interface.dev.init()?;
        let ethernet_addr = self.interface.ethernet_addr;
        self.interface.dev.set_ethernet_addr(ethernet_addr);
        Ok(())
    }

    /// Processes received frames and then runs the ARP and DHCP timers once.
    pub fn poll(&mut self) {
        self.recv();

        if let Err(err) = arp::tick(&mut self.interface) {
            warn!("ARP tick failed with {}.", err);
        }

        if let Err(err) = self.dhcp.poll(&mut self.interface) {
            warn!("DHCP poll failed with {}.", err);
        }
    }

    fn recv(&mut self) {
        for _ in 0 .. RX_BURST {
            let mut buffer = match self.interface.pool.allocate() {
                Ok(buffer) => buffer,
                Err(err) => {
                    warn!("Receiving frames failed with {}.", err);
                    break;
                }
            };

            let frame_len = match self.interface.dev.recv(buffer.frame_mut()) {
                Ok(frame_len) => frame_len,
                Err(Error::Exhausted) => {
                    self.interface.pool.free(buffer);
                    break;
                }
                Err(Error::Malformed) => {
                    self.interface.pool.free(buffer);
                    debug!("Device::recv(...) dropped a malformed frame.");
                    continue;
                }
                Err(err) => {
                    self.interface.pool.free(buffer);
                    warn!("Device::recv(...) failed with {}.", err);
                    break;
                }
            };

            if let Err(err) = buffer.set_len(frame_len) {
                self.interface.pool.free(buffer);
                warn!("Dropping frame of {} bytes with {}.", frame_len, err);
                continue;
            }

            match ethernet::recv_frame(&mut self.interface, buffer) {
                Ok(_) => {}
                Err(err @ Error::Ignored) | Err(err @ Error::Malformed) | Err(err @ Error::Checksum) => {
                    debug!("Dropped frame with {}.", err)
                }
                Err(err) => warn!("Processing frame failed with {}.", err),
            }
        }
    }
}
