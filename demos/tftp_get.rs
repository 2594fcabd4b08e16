#[macro_use]
extern crate clap;

use std::fs::File;
use std::io::Write;
use std::str::FromStr;

use embnet::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use embnet::demos::{
    env,
    tftp_get,
};

/// Acquires a DHCP lease and downloads a file from a TFTP server.
fn main() {
    env_logger::init();

    let matches = clap_app!(app =>
        (@arg SERVER:    +takes_value +required "IP address of the TFTP server")
        (@arg FILE:      +takes_value +required "File to download")
        (@arg OUTPUT:    -o --output +takes_value "Where to write the file, stdout by default")
        (@arg INTERFACE: -i --interface +takes_value "TAP interface to use, tap0 by default")
        (@arg MAC:       -m --mac +takes_value "MAC address of the stack")
    ).get_matches();

    let server_ip = matches
        .value_of("SERVER")
        .and_then(|addr| Ipv4Address::from_str(addr).ok())
        .expect("Bad IP address!");

    let filename = matches.value_of("FILE").expect("No file!");

    let ifr_name = matches.value_of("INTERFACE").unwrap_or(&env::DEFAULT_IFR_NAME);

    let eth_addr = matches
        .value_of("MAC")
        .map(|mac| EthernetAddress::from_str(mac).expect("Bad MAC address!"))
        .unwrap_or(*env::DEFAULT_ETH_ADDR);

    let mut stack = env::default_stack(ifr_name, eth_addr);

    if let Err(err) = env::acquire_lease(&mut stack, 30_000) {
        eprintln!("No lease acquired: {}.", err);
        std::process::exit(1);
    }

    let file = match tftp_get(&mut stack, server_ip, filename, 10_000) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Downloading {} failed: {}.", filename, err);
            std::process::exit(1);
        }
    };

    eprintln!("Downloaded {} bytes.", file.len());

    match matches.value_of("OUTPUT") {
        Some(path) => File::create(path)
            .and_then(|mut out| out.write_all(&file))
            .expect("Writing the file failed!"),
        None => std::io::stdout()
            .write_all(&file)
            .expect("Writing the file failed!"),
    }
}
