use std::thread;
use std::time::Duration;

use crate::core::dev::Device;
use crate::core::repr::EthernetAddress;
use crate::core::service::Interface;
use crate::core::stack::Stack;
use crate::core::time::{
    elapsed,
    SystemEnv,
    Ticks,
};
use crate::{
    Error,
    Result,
};

/// Sleep between two polls of a stack.
pub static POLL_INTERVAL: Duration = Duration::from_millis(1);

lazy_static! {
    /// Default TAP interface name.
    pub static ref DEFAULT_IFR_NAME: String = String::from("tap0");

    /// Default interface MAC address.
    pub static ref DEFAULT_ETH_ADDR: EthernetAddress = {
        EthernetAddress::new([0x06, 0x11, 0x22, 0x33, 0x44, 0x55])
    };
}

#[cfg(target_os = "linux")]
pub fn default_dev(ifr_name: &str) -> Box<dyn Device> {
    use crate::linux::Tap;

    match Tap::new(ifr_name) {
        Ok(tap) => Box::new(tap),
        Err(err) => panic!("Opening TAP {} failed with {}.", ifr_name, err),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn default_dev(_ifr_name: &str) -> Box<dyn Device> {
    panic!("Sorry, demos are only supported on Linux.");
}

/// Creates and initializes a stack on a TAP interface.
pub fn default_stack(ifr_name: &str, ethernet_addr: EthernetAddress) -> Stack {
    let interface = Interface::new(
        default_dev(ifr_name),
        Box::new(SystemEnv::new()),
        ethernet_addr,
    );

    let mut stack = Stack::new(interface);
    if let Err(err) = stack.init() {
        panic!("Bringing up {} failed with {}.", ifr_name, err);
    }

    println!(
        "Interface: (Name = {}, MTU = {}, MAC = {})",
        ifr_name,
        stack.interface.dev.max_transmission_unit(),
        stack.interface.ethernet_addr,
    );

    stack
}

/// Polls a stack once and sleeps for `POLL_INTERVAL`.
pub fn tick(stack: &mut Stack) {
    stack.poll();
    thread::sleep(POLL_INTERVAL);
}

/// Runs DHCP until a lease is bound or the timeout, in milliseconds, expires.
pub fn acquire_lease(stack: &mut Stack, timeout: Ticks) -> Result<()> {
    let since = stack.interface.now();
    stack.dhcp.start(&mut stack.interface)?;

    while !stack.dhcp.is_bound() {
        if elapsed(since, stack.interface.now()) >= timeout {
            return Err(Error::Exhausted);
        }
        tick(stack);
    }

    println!(
        "Lease: (IPv4 = {}, Netmask = {}, Server = {}, Time = {} s)",
        stack.dhcp.leased_ip(),
        stack.dhcp.netmask(),
        stack.dhcp.server_ip(),
        stack.dhcp.lease_time() / 1000,
    );

    Ok(())
}
