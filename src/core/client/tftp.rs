use crate::core::backoff::Backoff;
use crate::core::repr::tftp::{
    BLOCK_SIZE,
    SERVER_PORT,
};
use crate::core::repr::{
    tftp_error_codes,
    Ipv4Address,
    TftpRepr,
};
use crate::core::service::{
    discard,
    udp,
    Interface,
};
use crate::core::storage::PacketBuffer;
use crate::core::time::Ticks;
use crate::{
    Error,
    Result,
};

/// Local port used by `TftpConnection::new()`.
pub const TFTP_CLIENT_PORT: u16 = 23456;

/// Longest filename a download accepts, in bytes.
pub const TFTP_MAX_FILENAME_LEN: usize = 64;

pub const TFTP_BACKOFF_START: Ticks = 500;

pub const TFTP_BACKOFF_MAX: Ticks = 10_000;

pub const TFTP_BACKOFF_JITTER_FRACTION: u32 = 4;

/// State of a TFTP download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// No download started.
    Idle,
    /// Sending the read request until the server acknowledges the options.
    Request,
    /// Receiving data blocks.
    Read,
    /// The whole file was received.
    Done,
    /// The download failed or was aborted.
    Error,
}

/// A TFTP client connection downloading one file at a time.
///
/// Each connection listens on its own client port, so several connections
/// can run side by side on one interface as long as their ports differ.
#[derive(Debug)]
pub struct TftpConnection {
    state: State,
    server_ip: Ipv4Address,
    client_port: u16,
    server_port: u16,
    /// Last block received and acknowledged, zero before the first.
    block: u16,
    filename: String,
    backoff: Backoff,
    last_error: Option<(u16, String)>,
}

impl TftpConnection {
    pub fn new() -> TftpConnection {
        TftpConnection::with_client_port(TFTP_CLIENT_PORT)
    }

    pub fn with_client_port(client_port: u16) -> TftpConnection {
        TftpConnection {
            state: State::Idle,
            server_ip: Ipv4Address::UNSPECIFIED,
            client_port,
            server_port: SERVER_PORT,
            block: 0,
            filename: String::new(),
            backoff: Backoff::new(
                TFTP_BACKOFF_START,
                TFTP_BACKOFF_MAX,
                TFTP_BACKOFF_JITTER_FRACTION,
            ),
            last_error: None,
        }
    }

    /// Starts downloading a file from a server. The file is then received
    /// through `read(...)`.
    pub fn download(&mut self, interface: &mut Interface, filename: &str, server_ip: Ipv4Address) -> Result<()> {
        if filename.is_empty() || filename.len() > TFTP_MAX_FILENAME_LEN || filename.contains('\0') {
            return Err(Error::Malformed);
        }

        udp::listen(interface, self.client_port, 1)?;

        self.filename = filename.to_string();
        self.server_ip = server_ip;
        self.server_port = SERVER_PORT;
        self.block = 0;
        self.last_error = None;
        self.backoff.reset();
        self.set_state(State::Request);

        Ok(())
    }

    /// Runs the download and copies the next block of the file into buffer.
    ///
    /// The buffer should hold `BLOCK_SIZE` bytes, any excess of a block is
    /// lost.
    ///
    /// # Returns
    ///
    /// The number of bytes copied, zero if no new block arrived.
    pub fn read(&mut self, interface: &mut Interface, buffer: &mut [u8]) -> Result<usize> {
        match self.state {
            State::Request => self.read_option_ack(interface).map(|_| 0),
            State::Read => self.read_data(interface, buffer),
            State::Idle | State::Done | State::Error => Ok(0),
        }
    }

    /// Tells the server the download is cancelled and gives up on it.
    ///
    /// Nothing is sent unless a transfer is in progress.
    pub fn abort(&mut self, interface: &mut Interface, message: &str) -> Result<()> {
        match self.state {
            State::Request | State::Read => {}
            State::Idle => {
                self.set_state(State::Error);
                return Ok(());
            }
            State::Done | State::Error => return Ok(()),
        }

        let sent = self.send(
            interface,
            &TftpRepr::Error {
                code: tftp_error_codes::NOT_DEFINED,
                message,
            },
            self.server_port,
        );

        self.stop(interface, State::Error);
        sent
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Returns the last error code and message sent by the server.
    pub fn last_error(&self) -> Option<(u16, &str)> {
        self.last_error
            .as_ref()
            .map(|&(code, ref message)| (code, message.as_str()))
    }

    /// Returns the last block received.
    pub fn block(&self) -> u16 {
        self.block
    }

    pub fn client_port(&self) -> u16 {
        self.client_port
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            debug!("TFTP state {:?} -> {:?}.", self.state, state);
            self.state = state;
        }
    }

    fn stop(&mut self, interface: &mut Interface, state: State) {
        udp::unlisten(interface, self.client_port);
        self.set_state(state);
    }

    fn fail(&mut self, interface: &mut Interface, code: u16, message: &str) {
        warn!("TFTP server failed {} with {}: {}.", self.filename, code, message);
        self.last_error = Some((code, message.to_string()));
        self.stop(interface, State::Error);
    }

    /// Takes the next packet received from the server's address.
    fn recv(&self, interface: &mut Interface) -> Option<PacketBuffer> {
        while let Some(packet) = udp::recv(interface, self.client_port) {
            if packet.senders_ip == self.server_ip && packet.len() >= 2 {
                return Some(packet);
            }

            debug!("Ignoring TFTP packet from {}.", packet.senders_ip);
            interface.pool.free(packet);
        }

        None
    }

    fn read_option_ack(&mut self, interface: &mut Interface) -> Result<()> {
        let now = interface.now();
        if self.backoff.timeout(now) {
            self.backoff.fire(now, &mut interface.rng);
            debug!("Sending TFTP read request for {}.", self.filename);
            self.send(
                interface,
                &TftpRepr::ReadRequest {
                    filename: &self.filename,
                    block_size: Some(BLOCK_SIZE as u16),
                },
                self.server_port,
            )?;
        }

        let packet = match self.recv(interface) {
            Some(packet) => packet,
            None => return Ok(()),
        };

        match TftpRepr::parse(packet.payload()) {
            Ok(TftpRepr::OptionAck {
                block_size: Some(block_size),
            }) if block_size as usize == BLOCK_SIZE =>
            {
                self.server_port = packet.source_port;
                self.block = 0;
                self.set_state(State::Read);
            }
            Ok(TftpRepr::Error { code, message }) => {
                self.fail(interface, code, message);
            }
            _ => {
                warn!("Unexpected TFTP reply to the read request for {}.", self.filename);
                self.stop(interface, State::Error);
            }
        }
        interface.pool.free(packet);

        if self.state != State::Read {
            return Ok(());
        }

        // The option acknowledgement is acknowledged with block zero.
        self.backoff.reset();
        self.backoff.fire(now, &mut interface.rng);
        self.send_ack(interface)
    }

    fn read_data(&mut self, interface: &mut Interface, buffer: &mut [u8]) -> Result<usize> {
        let now = interface.now();
        if self.backoff.timeout(now) {
            self.backoff.fire(now, &mut interface.rng);
            debug!("Resending TFTP ACK for block {}.", self.block);
            self.send_ack(interface)?;
        }

        let packet = match self.recv(interface) {
            Some(packet) => packet,
            None => return Ok(0),
        };

        let read = self.process_data(interface, &packet, buffer, now);
        interface.pool.free(packet);
        read
    }

    fn process_data(
        &mut self,
        interface: &mut Interface,
        packet: &PacketBuffer,
        buffer: &mut [u8],
        now: Ticks,
    ) -> Result<usize> {
        if packet.source_port != self.server_port {
            debug!("Rejecting TFTP packet from port {}.", packet.source_port);
            self.send(
                interface,
                &TftpRepr::Error {
                    code: tftp_error_codes::UNKNOWN_TID,
                    message: "Unknown transfer ID",
                },
                packet.source_port,
            )?;
            return Ok(0);
        }

        match TftpRepr::parse(packet.payload()) {
            Ok(TftpRepr::Data { block, .. }) if block == self.block => {
                debug!("Received TFTP block {} again.", block);
                self.send_ack(interface)?;
                Ok(0)
            }
            Ok(TftpRepr::Data { block, data }) if block == self.block.wrapping_add(1) => {
                let count = data.len().min(buffer.len());
                buffer[.. count].copy_from_slice(&data[.. count]);
                self.block = block;

                self.backoff.reset();
                self.backoff.fire(now, &mut interface.rng);
                if let Err(err) = self.send_ack(interface) {
                    warn!("Sending TFTP ACK for block {} failed with {}.", block, err);
                }

                if data.len() < BLOCK_SIZE {
                    info!("TFTP download of {} complete.", self.filename);
                    self.stop(interface, State::Done);
                }

                Ok(count)
            }
            Ok(TftpRepr::Data { block, .. }) => {
                debug!("Ignoring out of order TFTP block {}.", block);
                Ok(0)
            }
            Ok(TftpRepr::Error { code, message }) => {
                self.fail(interface, code, message);
                Ok(0)
            }
            Ok(_) => Ok(0),
            Err(err) => {
                debug!("Dropping TFTP packet with {}.", err);
                Ok(0)
            }
        }
    }

    fn send_ack(&self, interface: &mut Interface) -> Result<()> {
        self.send(interface, &TftpRepr::Ack { block: self.block }, self.server_port)
    }

    fn send(&self, interface: &mut Interface, tftp_repr: &TftpRepr, dst_port: u16) -> Result<()> {
        let mut buffer = interface.pool.allocate()?;
        let written = buffer
            .set_len(tftp_repr.buffer_len())
            .and_then(|_| tftp_repr.emit(buffer.payload_mut()));

        if let Err(err) = written {
            return discard(interface, buffer, err);
        }

        udp::send_packet(
            interface,
            buffer,
            self.client_port,
            dst_port,
            self.server_ip,
        )
    }
}

impl Default for TftpConnection {
    fn default() -> TftpConnection {
        TftpConnection::new()
    }
}
