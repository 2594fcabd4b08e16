use std::fmt::{
    Debug,
    Formatter,
    Result as FmtResult,
};
use std::io;

use crate::core::dev::Device;
use crate::linux::libc as _libc;
use crate::{
    Error,
    Result,
};

/// [TAP interface](https://www.kernel.org/doc/Documentation/networking/tuntap.txt)
/// for sending and receiving raw ethernet frames.
pub struct Tap {
    tapfd: libc::c_int,
    ifr_name: String,
    max_transmission_unit: usize,
}

impl Tap {
    /// Creates or binds to an existing TAP interface in non-blocking mode.
    pub fn new(ifr_name: &str) -> Result<Tap> {
        if ifr_name.is_empty() || ifr_name.len() >= libc::IF_NAMESIZE {
            return Err(Error::IO(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bad interface name",
            )));
        }

        let ifreq = _libc::c_ifreq::with_name(ifr_name);

        let tapfd = unsafe {
            libc::open(
                "/dev/net/tun\0".as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK,
            )
        };

        if tapfd < 0 {
            return Err(Error::IO(io::Error::last_os_error()));
        }

        // Closes the descriptor on any error below.
        let mut tap = Tap {
            tapfd,
            ifr_name: ifr_name.to_string(),
            max_transmission_unit: 0,
        };

        let mut _ifreq = ifreq;
        _ifreq.ifr_ifru.ifr_flags = _libc::IFF_TAP | _libc::IFF_NO_PI;
        if unsafe { libc::ioctl(tap.tapfd, _libc::TUNSETIFF, &mut _ifreq as *mut _libc::c_ifreq) } == -1 {
            return Err(Error::IO(io::Error::last_os_error()));
        }

        tap.max_transmission_unit = Tap::query_mtu(ifreq)?;

        Ok(tap)
    }

    pub fn name(&self) -> &str {
        &self.ifr_name
    }

    fn query_mtu(mut ifreq: _libc::c_ifreq) -> Result<usize> {
        let sockfd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if sockfd == -1 {
            return Err(Error::IO(io::Error::last_os_error()));
        }

        let res = unsafe { libc::ioctl(sockfd, _libc::SIOCGIFMTU, &mut ifreq as *mut _libc::c_ifreq) };
        let err = io::Error::last_os_error();

        unsafe {
            libc::close(sockfd);
        }

        if res == -1 {
            return Err(Error::IO(err));
        }

        // The MTU excludes the Ethernet header.
        Ok(unsafe { ifreq.ifr_ifru.ifr_mtu } as usize + 14)
    }
}

impl Debug for Tap {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "Tap({}, MTU = {})", self.ifr_name, self.max_transmission_unit)
    }
}

impl Device for Tap {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        let wrote = unsafe {
            libc::write(
                self.tapfd,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len(),
            )
        };

        if wrote < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                Err(Error::Busy)
            } else {
                Err(Error::IO(err))
            }
        } else {
            Ok(())
        }
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let read = unsafe {
            libc::read(
                self.tapfd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
            )
        };

        if read < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                Err(Error::Exhausted)
            } else {
                Err(Error::IO(err))
            }
        } else {
            Ok(read as usize)
        }
    }

    fn max_transmission_unit(&self) -> usize {
        self.max_transmission_unit
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.tapfd);
        }
    }
}
