#[macro_use]
extern crate clap;

use std::str::FromStr;

use embnet::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use embnet::demos::env;

/// Brings up a stack on a TAP interface, answering ARP and ping until
/// interrupted.
fn main() {
    env_logger::init();

    let matches = clap_app!(app =>
        (@arg INTERFACE: -i --interface +takes_value "TAP interface to use, tap0 by default")
        (@arg MAC:       -m --mac +takes_value "MAC address of the stack")
        (@arg ADDRESS:   -a --address +takes_value "Static IP address, DHCP is used otherwise")
        (@arg NETMASK:   -n --netmask +takes_value "Netmask of the static IP address")
    ).get_matches();

    let ifr_name = matches.value_of("INTERFACE").unwrap_or(&env::DEFAULT_IFR_NAME);

    let eth_addr = matches
        .value_of("MAC")
        .map(|mac| EthernetAddress::from_str(mac).expect("Bad MAC address!"))
        .unwrap_or(*env::DEFAULT_ETH_ADDR);

    let mut stack = env::default_stack(ifr_name, eth_addr);

    match matches.value_of("ADDRESS") {
        Some(addr) => {
            let addr = Ipv4Address::from_str(addr).expect("Bad IP address!");
            let netmask = matches
                .value_of("NETMASK")
                .map(|netmask| Ipv4Address::from_str(netmask).expect("Bad netmask!"))
                .unwrap_or(Ipv4Address::new([255, 255, 255, 0]));
            stack.interface.set_ipv4_config(addr, netmask);
        }
        None => {
            stack
                .dhcp
                .start(&mut stack.interface)
                .expect("Starting DHCP failed!");
        }
    }

    println!("{} is UP!", ifr_name);

    loop {
        env::tick(&mut stack);
    }
}
