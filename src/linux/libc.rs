pub const IFF_TAP: libc::c_short = 0x0002;

pub const IFF_NO_PI: libc::c_short = 0x1000;

pub const TUNSETIFF: libc::c_ulong = 0x400454CA;

pub const SIOCGIFMTU: libc::c_ulong = 0x8921;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
pub union c_ifr_ifru {
    pub ifr_flags: libc::c_short,
    pub ifr_mtu: libc::c_int,
    _pad: [u8; 24],
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
/// [https://linux.die.net/man/7/netdevice](https://linux.die.net/man/7/netdevice)
pub struct c_ifreq {
    pub ifr_name: [libc::c_char; libc::IF_NAMESIZE],
    pub ifr_ifru: c_ifr_ifru,
}

impl c_ifreq {
    /// Creates a request for an interface, the name must be shorter than
    /// `IF_NAMESIZE` to leave room for the NUL.
    pub fn with_name(ifr_name: &str) -> c_ifreq {
        assert!(ifr_name.len() < libc::IF_NAMESIZE);

        let mut ifreq = c_ifreq {
            ifr_name: [0; libc::IF_NAMESIZE],
            ifr_ifru: c_ifr_ifru { _pad: [0; 24] },
        };

        for (i, c) in ifr_name.as_bytes().iter().enumerate() {
            ifreq.ifr_name[i] = *c as libc::c_char;
        }

        ifreq
    }
}
