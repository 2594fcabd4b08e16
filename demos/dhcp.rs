#[macro_use]
extern crate clap;

use std::str::FromStr;

use embnet::core::repr::EthernetAddress;
use embnet::demos::env;

/// Acquires a DHCP lease on a TAP interface and prints it.
fn main() {
    env_logger::init();

    let matches = clap_app!(app =>
        (@arg INTERFACE: -i --interface +takes_value "TAP interface to use, tap0 by default")
        (@arg MAC:       -m --mac +takes_value "MAC address of the stack")
        (@arg TIMEOUT:   -t --timeout +takes_value "Seconds to wait for a lease")
    ).get_matches();

    let ifr_name = matches.value_of("INTERFACE").unwrap_or(&env::DEFAULT_IFR_NAME);

    let eth_addr = matches
        .value_of("MAC")
        .map(|mac| EthernetAddress::from_str(mac).expect("Bad MAC address!"))
        .unwrap_or(*env::DEFAULT_ETH_ADDR);

    let timeout = matches
        .value_of("TIMEOUT")
        .map(|timeout| timeout.parse::<u32>().expect("Bad timeout!"))
        .unwrap_or(30);

    let mut stack = env::default_stack(ifr_name, eth_addr);

    if let Err(err) = env::acquire_lease(&mut stack, timeout * 1000) {
        eprintln!("No lease acquired: {}.", err);
        std::process::exit(1);
    }

    if let Err(err) = stack.dhcp.release(&mut stack.interface) {
        eprintln!("Releasing the lease failed: {}.", err);
    }
}
