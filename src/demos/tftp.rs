use crate::core::client::{
    TftpConnection,
    TftpState,
};
use crate::core::repr::tftp::BLOCK_SIZE;
use crate::core::repr::Ipv4Address;
use crate::core::stack::Stack;
use crate::core::time::{
    elapsed,
    Ticks,
};
use crate::demos::env;
use crate::{
    Error,
    Result,
};

/// Downloads a file via TFTP, giving up if no block arrives for timeout
/// milliseconds.
pub fn tftp_get(stack: &mut Stack, server_ip: Ipv4Address, filename: &str, timeout: Ticks) -> Result<Vec<u8>> {
    let mut connection = TftpConnection::new();
    connection.download(&mut stack.interface, filename, server_ip)?;

    let mut file = Vec::new();
    let mut block = [0; BLOCK_SIZE];
    let mut last_block_at = stack.interface.now();

    loop {
        let read = connection.read(&mut stack.interface, &mut block)?;
        if read > 0 {
            file.extend_from_slice(&block[.. read]);
            last_block_at = stack.interface.now();
        }

        match connection.state() {
            TftpState::Done => return Ok(file),
            TftpState::Error => {
                if let Some((code, message)) = connection.last_error() {
                    eprintln!("TFTP error {}: {}", code, message);
                }
                return Err(Error::Malformed);
            }
            _ => {}
        }

        if elapsed(last_block_at, stack.interface.now()) >= timeout {
            if let Err(err) = connection.abort(&mut stack.interface, "Timeout") {
                warn!("Aborting TFTP download failed with {}.", err);
            }
            return Err(Error::Exhausted);
        }

        env::tick(stack);
    }
}
