//! Interface control through an ancillary `AF_INET` datagram socket.
//!
//! MTU and link flags are interface properties, so they are set through a
//! plain addressable socket rather than the tun/utun descriptor itself.

#![cfg_attr(not(any(target_os = "linux", target_os = "macos")), allow(dead_code))]

use crate::error::{DeviceError, Result, TunError};
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};

pub(crate) const IFNAMSIZ: usize = 16;

const IFF_UP: libc::c_short = 0x1;
const IFF_RUNNING: libc::c_short = 0x40;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod req {
    pub const SIOCGIFFLAGS: u64 = 0x8913;
    pub const SIOCSIFFLAGS: u64 = 0x8914;
    pub const SIOCGIFMTU: u64 = 0x8921;
    pub const SIOCSIFMTU: u64 = 0x8922;
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod req {
    pub const SIOCGIFFLAGS: u64 = 0xc020_6911;
    pub const SIOCSIFFLAGS: u64 = 0x8020_6910;
    pub const SIOCGIFMTU: u64 = 0xc020_6933;
    pub const SIOCSIFMTU: u64 = 0x8020_6934;
}

#[inline]
pub(crate) unsafe fn ioctl_raw(fd: libc::c_int, request: u64, arg: *mut libc::c_void) -> libc::c_int {
    #[cfg(target_os = "linux")]
    {
        libc::ioctl(fd, request as libc::Ioctl, arg)
    }
    #[cfg(target_os = "android")]
    {
        libc::ioctl(fd, request as libc::c_int, arg)
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        libc::ioctl(fd, request as libc::c_ulong, arg)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IOCTL STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

fn ifr_name(name: &str) -> Result<[u8; IFNAMSIZ]> {
    if name.is_empty() || name.len() >= IFNAMSIZ {
        return Err(TunError::InvalidName(name.to_string()).into());
    }
    let mut buf = [0u8; IFNAMSIZ];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    Ok(buf)
}

/// Name as returned by the kernel, up to the first NUL.
pub(crate) fn name_from_bytes(raw: &[u8]) -> String {
    raw.iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as char)
        .collect()
}

#[repr(C)]
struct IfReqFlags {
    ifr_name: [u8; IFNAMSIZ],
    ifr_flags: libc::c_short,
    _pad: [u8; 22],
}

#[repr(C)]
struct IfReqMtu {
    ifr_name: [u8; IFNAMSIZ],
    ifr_mtu: libc::c_int,
    _pad: [u8; 20],
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTROL SOCKET
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) struct ControlSocket {
    fd: OwnedFd,
}

impl ControlSocket {
    pub(crate) fn open() -> Result<Self> {
        let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if sock < 0 {
            let err = io::Error::last_os_error();
            return Err(DeviceError::ConfigFailed(format!("control socket: {}", err)));
        }
        Ok(ControlSocket { fd: unsafe { OwnedFd::from_raw_fd(sock) } })
    }

    fn ioctl<T>(&self, request: u64, arg: &mut T, what: &str) -> Result<()> {
        let result =
            unsafe { ioctl_raw(self.fd.as_raw_fd(), request, arg as *mut T as *mut libc::c_void) };
        if result < 0 {
            let err = io::Error::last_os_error();
            return Err(DeviceError::ConfigFailed(format!("{}: {}", what, err)));
        }
        Ok(())
    }

    pub(crate) fn mtu(&self, name: &str) -> Result<usize> {
        let mut ifr = IfReqMtu { ifr_name: ifr_name(name)?, ifr_mtu: 0, _pad: [0; 20] };
        self.ioctl(req::SIOCGIFMTU, &mut ifr, "SIOCGIFMTU")?;
        Ok(ifr.ifr_mtu as usize)
    }

    pub(crate) fn set_mtu(&self, name: &str, mtu: usize) -> Result<()> {
        log::debug!("Setting MTU of {}: {}", name, mtu);
        let mut ifr = IfReqMtu { ifr_name: ifr_name(name)?, ifr_mtu: mtu as libc::c_int, _pad: [0; 20] };
        self.ioctl(req::SIOCSIFMTU, &mut ifr, "SIOCSIFMTU")
    }

    /// Raise or clear `IFF_UP | IFF_RUNNING`, keeping every other flag.
    pub(crate) fn set_up(&self, name: &str, up: bool) -> Result<()> {
        let mut ifr = IfReqFlags { ifr_name: ifr_name(name)?, ifr_flags: 0, _pad: [0; 22] };
        self.ioctl(req::SIOCGIFFLAGS, &mut ifr, "SIOCGIFFLAGS")?;

        if up {
            ifr.ifr_flags |= IFF_UP | IFF_RUNNING;
        } else {
            ifr.ifr_flags &= !(IFF_UP | IFF_RUNNING);
        }

        self.ioctl(req::SIOCSIFFLAGS, &mut ifr, "SIOCSIFFLAGS")?;
        log::info!("Interface {} is {}", name, if up { "UP" } else { "DOWN" });
        Ok(())
    }
}
