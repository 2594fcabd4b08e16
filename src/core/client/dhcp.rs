use rand::Rng;

use crate::core::backoff::Backoff;
use crate::core::repr::dhcp::{
    CLIENT_PORT,
    SERVER_PORT,
};
use crate::core::repr::{
    DhcpMessageType,
    DhcpOpCode,
    DhcpPacket,
    DhcpRepr,
    Ipv4Address,
};
use crate::core::service::{
    discard,
    udp,
    Interface,
};
use crate::core::time::{
    elapsed,
    Ticks,
};
use crate::Result;

pub const DHCP_BACKOFF_START: Ticks = 500;

pub const DHCP_BACKOFF_MAX: Ticks = 60_000;

pub const DHCP_BACKOFF_JITTER_FRACTION: u32 = 4;

/// Longest lease, in seconds, representable in `Ticks`. Longer leases are
/// shortened to this and renewed early.
pub const DHCP_MAX_LEASE_SECS: u32 = std::u32::MAX / 1000;

/// State of a DHCP client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Not started, or released.
    Disabled,
    /// Broadcasting DISCOVER until an OFFER arrives.
    Discover,
    /// Requesting the offered lease until an ACK or NAK arrives.
    Requesting,
    /// Holding a lease.
    Bound,
    /// Past half the lease, asking the leasing server for an extension.
    Renewing,
    /// Past three quarters of the lease, asking any server for an extension.
    Rebinding,
    /// Sink state. Nothing transitions here at the moment.
    Error,
}

/// A DHCP client acquiring and keeping an IPv4 lease for an interface.
///
/// Call `start(...)` once, then `poll(...)` regularly. The interface's IPv4
/// configuration is set when a lease is bound and cleared when it's lost.
#[derive(Debug)]
pub struct DhcpClient {
    state: State,
    transaction_id: u32,
    started_at: Ticks,
    lease_start: Ticks,
    /// Lease length in milliseconds.
    lease_time: Ticks,
    leased_ip: Ipv4Address,
    server_ip: Ipv4Address,
    netmask: Ipv4Address,
    backoff: Backoff,
    acquisition_count: u32,
}

impl DhcpClient {
    pub fn new() -> DhcpClient {
        DhcpClient {
            state: State::Disabled,
            transaction_id: 0,
            started_at: 0,
            lease_start: 0,
            lease_time: 0,
            leased_ip: Ipv4Address::UNSPECIFIED,
            server_ip: Ipv4Address::UNSPECIFIED,
            netmask: Ipv4Address::UNSPECIFIED,
            backoff: Backoff::new(
                DHCP_BACKOFF_START,
                DHCP_BACKOFF_MAX,
                DHCP_BACKOFF_JITTER_FRACTION,
            ),
            acquisition_count: 0,
        }
    }

    /// Starts acquiring a lease with a fresh transaction ID.
    pub fn start(&mut self, interface: &mut Interface) -> Result<()> {
        udp::listen(interface, CLIENT_PORT, 1)?;

        self.transaction_id = interface.rng.gen();
        self.started_at = interface.now();
        self.backoff.reset();
        self.set_state(State::Discover);

        Ok(())
    }

    /// Runs the client: processes at most one received message, then sends
    /// whatever the current state calls for.
    pub fn poll(&mut self, interface: &mut Interface) -> Result<()> {
        if self.state == State::Disabled || self.state == State::Error {
            return Ok(());
        }

        if let Some(dhcp_repr) = self.recv(interface) {
            self.process(interface, &dhcp_repr);
        }

        self.tick(interface)
    }

    /// Gives the lease back to the server and stops the client.
    pub fn release(&mut self, interface: &mut Interface) -> Result<()> {
        let sent = if self.is_bound() {
            self.send(interface, DhcpMessageType::Release)
        } else {
            Ok(())
        };

        if self.is_bound() {
            interface.clear_ipv4_config();
        }
        udp::unlisten(interface, CLIENT_PORT);
        self.leased_ip = Ipv4Address::UNSPECIFIED;
        self.set_state(State::Disabled);

        sent
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Checks if the client holds a lease.
    pub fn is_bound(&self) -> bool {
        match self.state {
            State::Bound | State::Renewing | State::Rebinding => true,
            _ => false,
        }
    }

    pub fn server_ip(&self) -> Ipv4Address {
        self.server_ip
    }

    pub fn leased_ip(&self) -> Ipv4Address {
        self.leased_ip
    }

    pub fn netmask(&self) -> Ipv4Address {
        self.netmask
    }

    /// Returns the lease length in milliseconds, at most
    /// `DHCP_MAX_LEASE_SECS` seconds.
    pub fn lease_time(&self) -> Ticks {
        self.lease_time
    }

    /// Returns the number of times a requested lease was refused.
    pub fn acquisition_count(&self) -> u32 {
        self.acquisition_count
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            debug!("DHCP state {:?} -> {:?}.", self.state, state);
            self.state = state;
        }
    }

    /// Takes the next message received on the client port, if it's a well
    /// formed reply to us.
    fn recv(&self, interface: &mut Interface) -> Option<DhcpRepr> {
        let buffer = udp::recv(interface, CLIENT_PORT)?;

        let dhcp_repr = DhcpPacket::try_new(buffer.payload()).and_then(|dhcp_packet| {
            dhcp_packet.check_encoding()?;
            DhcpRepr::parse(&dhcp_packet)
        });
        interface.pool.free(buffer);

        let dhcp_repr = match dhcp_repr {
            Ok(dhcp_repr) => dhcp_repr,
            Err(err) => {
                debug!("Dropping DHCP message with {}.", err);
                return None;
            }
        };

        if dhcp_repr.op != DhcpOpCode::Reply
            || dhcp_repr.transaction_id != self.transaction_id
            || dhcp_repr.client_hw_addr != interface.ethernet_addr
        {
            debug!(
                "Ignoring DHCP message with transaction ID {:#010x}.",
                dhcp_repr.transaction_id
            );
            return None;
        }

        Some(dhcp_repr)
    }

    fn process(&mut self, interface: &mut Interface, dhcp_repr: &DhcpRepr) {
        let now = interface.now();

        match (self.state, dhcp_repr.message_type) {
            (State::Discover, DhcpMessageType::Offer) => {
                let (netmask, server_ip, lease_time) =
                    match (dhcp_repr.netmask, dhcp_repr.server_id, dhcp_repr.lease_time) {
                        (Some(netmask), Some(server_ip), Some(lease_time)) => {
                            (netmask, server_ip, lease_time)
                        }
                        _ => {
                            debug!("Ignoring DHCP offer with missing options.");
                            return;
                        }
                    };

                debug!(
                    "DHCP server {} offered {}/{} for {} s.",
                    server_ip, dhcp_repr.your_ip, netmask, lease_time
                );
                self.leased_ip = dhcp_repr.your_ip;
                self.server_ip = server_ip;
                self.netmask = netmask;
                self.backoff.reset();
                self.set_state(State::Requesting);
            }
            (State::Requesting, DhcpMessageType::Ack) => {
                let lease_time = match dhcp_repr.lease_time {
                    Some(lease_time) => lease_time,
                    None => return,
                };

                if !self.matches_lease(dhcp_repr) {
                    debug!("Ignoring DHCP ACK which does not match the offer.");
                    return;
                }

                self.bind(interface, lease_time, now);
            }
            (State::Requesting, DhcpMessageType::Nak) => {
                if !self.from_server(dhcp_repr) {
                    return;
                }

                debug!("DHCP server {} refused the lease.", self.server_ip);
                self.acquisition_count += 1;
                self.backoff.reset();
                self.set_state(State::Discover);
            }
            (State::Renewing, DhcpMessageType::Ack) | (State::Rebinding, DhcpMessageType::Ack) => {
                let lease_time = match dhcp_repr.lease_time {
                    Some(lease_time) if self.matches_lease(dhcp_repr) => lease_time,
                    _ => {
                        debug!("Ignoring DHCP ACK which does not match the lease.");
                        return;
                    }
                };

                self.bind(interface, lease_time, now);
            }
            (State::Renewing, DhcpMessageType::Nak) | (State::Rebinding, DhcpMessageType::Nak) => {
                // While rebinding any server may answer.
                if self.state == State::Renewing && !self.from_server(dhcp_repr) {
                    return;
                }

                info!("DHCP lease on {} refused.", self.leased_ip);
                self.lose_lease(interface);
            }
            (state, message_type) => {
                debug!(
                    "Ignoring DHCP {:?} while in state {:?}.",
                    message_type, state
                );
            }
        }
    }

    fn tick(&mut self, interface: &mut Interface) -> Result<()> {
        let now = interface.now();
        let lease_elapsed = elapsed(self.lease_start, now);

        match self.state {
            State::Bound => {
                if lease_elapsed > self.lease_time / 2 {
                    self.backoff.reset();
                    self.set_state(State::Renewing);
                }
                Ok(())
            }
            State::Renewing if lease_elapsed > self.lease_time / 4 * 3 => {
                self.backoff.reset();
                self.set_state(State::Rebinding);
                Ok(())
            }
            State::Rebinding if lease_elapsed >= self.lease_time => {
                info!("DHCP lease on {} expired.", self.leased_ip);
                self.lose_lease(interface);
                Ok(())
            }
            State::Discover | State::Requesting | State::Renewing | State::Rebinding => {
                if !self.backoff.timeout(now) {
                    return Ok(());
                }
                self.backoff.fire(now, &mut interface.rng);

                let message_type = match self.state {
                    State::Discover => DhcpMessageType::Discover,
                    _ => DhcpMessageType::Request,
                };
                self.send(interface, message_type)
            }
            State::Disabled | State::Error => Ok(()),
        }
    }

    /// Checks an ACK against the server, address and netmask we hold.
    fn matches_lease(&self, dhcp_repr: &DhcpRepr) -> bool {
        dhcp_repr.server_id == Some(self.server_ip)
            && dhcp_repr.netmask == Some(self.netmask)
            && dhcp_repr.your_ip == self.leased_ip
    }

    fn bind(&mut self, interface: &mut Interface, lease_time: u32, now: Ticks) {
        let lease_time = if lease_time > DHCP_MAX_LEASE_SECS {
            debug!(
                "Clamping DHCP lease of {} s to {} s.",
                lease_time, DHCP_MAX_LEASE_SECS
            );
            DHCP_MAX_LEASE_SECS
        } else {
            lease_time
        };

        self.lease_start = now;
        self.lease_time = lease_time * 1000;
        self.backoff.reset();

        if !self.is_bound() {
            info!(
                "DHCP bound to {}/{} from {} for {} s.",
                self.leased_ip, self.netmask, self.server_ip, lease_time
            );
        }
        interface.set_ipv4_config(self.leased_ip, self.netmask);
        self.set_state(State::Bound);
    }

    fn lose_lease(&mut self, interface: &mut Interface) {
        interface.clear_ipv4_config();
        self.leased_ip = Ipv4Address::UNSPECIFIED;
        self.backoff.reset();
        self.set_state(State::Discover);
    }

    /// Checks if a reply comes from the server we're dealing with. Replies
    /// without a server ID are given the benefit of the doubt.
    fn from_server(&self, dhcp_repr: &DhcpRepr) -> bool {
        dhcp_repr.server_id.map_or(true, |server_ip| server_ip == self.server_ip)
    }

    fn send(&mut self, interface: &mut Interface, message_type: DhcpMessageType) -> Result<()> {
        let mut dhcp_repr = DhcpRepr::request(
            message_type,
            self.transaction_id,
            interface.ethernet_addr,
        );

        let secs = elapsed(self.started_at, interface.now()) / 1000;
        dhcp_repr.secs = secs.min(u16::max_value() as u32) as u16;

        match (message_type, self.state) {
            (DhcpMessageType::Release, _) => {
                dhcp_repr.secs = 0;
                dhcp_repr.client_ip = self.leased_ip;
                dhcp_repr.server_id = Some(self.server_ip);
            }
            (DhcpMessageType::Request, State::Requesting) => {
                dhcp_repr.requested_ip = Some(self.leased_ip);
                dhcp_repr.server_id = Some(self.server_ip);
            }
            (DhcpMessageType::Request, _) => {
                dhcp_repr.client_ip = self.leased_ip;
            }
            _ => {}
        }

        debug!("Sending DHCP {:?}.", message_type);

        let mut buffer = interface.pool.allocate()?;
        let written = buffer.set_len(dhcp_repr.buffer_len()).and_then(|_| {
            let mut dhcp_packet = DhcpPacket::try_new(buffer.payload_mut())?;
            dhcp_repr.emit(&mut dhcp_packet)
        });

        if let Err(err) = written {
            return discard(interface, buffer, err);
        }

        udp::send_packet(
            interface,
            buffer,
            CLIENT_PORT,
            SERVER_PORT,
            Ipv4Address::BROADCAST,
        )
    }
}

impl Default for DhcpClient {
    fn default() -> DhcpClient {
        DhcpClient::new()
    }
}
