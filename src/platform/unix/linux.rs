//! # Linux TUN/TAP Device
//!
//! `/dev/net/tun` clone device configured with `TUNSETIFF`.

use super::ifreq::{ioctl_raw, name_from_bytes, ControlSocket, IFNAMSIZ};
use super::{read_fd, set_nonblocking, write_fd};
use crate::config::{DeviceConfig, Mode};
use crate::constants::ETHERNET_HEADER_LEN;
use crate::device::{
    check_open, check_packet_len, check_read_buffer, validate_mtu, Device, DeviceState,
};
use crate::error::{DeviceError, Result, TunError};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

const CLONE_DEVICE: &str = "/dev/net/tun";

// linux/if_tun.h
const IFF_TUN: libc::c_short = 0x0001;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;

const TUNSETIFF: u64 = 0x4004_54ca;
const TUNSETPERSIST: u64 = 0x4004_54cb;
const TUNSETOWNER: u64 = 0x4004_54cc;
const TUNSETGROUP: u64 = 0x4004_54ce;

#[repr(C)]
struct IfReqTun {
    ifr_name: [u8; IFNAMSIZ],
    ifr_flags: libc::c_short,
    _pad: [u8; 22],
}

/// TUN or TAP interface backed by one descriptor on the clone device
pub struct LinuxTun {
    file: Option<File>,
    name: String,
    mtu: usize,
    mode: Mode,
    non_blocking: bool,
    state: DeviceState,
}

impl LinuxTun {
    #[inline]
    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    pub fn set_non_blocking(&mut self, non_blocking: bool) -> Result<()> {
        set_nonblocking(self.fd()?, non_blocking)?;
        self.non_blocking = non_blocking;
        Ok(())
    }

    /// Largest frame a single read can return.
    fn frame_len(&self) -> usize {
        match self.mode {
            Mode::Network => self.mtu,
            Mode::Link => self.mtu + ETHERNET_HEADER_LEN,
        }
    }

    fn fd(&self) -> Result<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd()).ok_or(DeviceError::Closed)
    }

    fn tun_ioctl(file: &File, request: u64, arg: libc::c_ulong, what: &str) -> Result<()> {
        let result = unsafe { ioctl_raw(file.as_raw_fd(), request, arg as usize as *mut libc::c_void) };
        if result < 0 {
            let err = io::Error::last_os_error();
            return Err(TunError::IoctlFailed(format!("{}: {}", what, err)).into());
        }
        Ok(())
    }
}

impl Device for LinuxTun {
    fn open(config: &DeviceConfig) -> Result<Self> {
        validate_mtu(config.mtu)?;
        let requested = config.requested_name();
        if requested.len() >= IFNAMSIZ {
            return Err(TunError::InvalidName(requested).into());
        }
        log::info!("Creating {} device: {}", config.mode, requested);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(CLONE_DEVICE)
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => TunError::PermissionDenied,
                io::ErrorKind::NotFound => TunError::DeviceNotFound(CLONE_DEVICE.into()),
                _ => TunError::OpenFailed(format!("{}: {}", CLONE_DEVICE, e)),
            })?;

        let kind = match config.mode {
            Mode::Network => IFF_TUN,
            Mode::Link => IFF_TAP,
        };
        let mut ifr = IfReqTun { ifr_name: [0; IFNAMSIZ], ifr_flags: kind | IFF_NO_PI, _pad: [0; 22] };
        ifr.ifr_name[..requested.len()].copy_from_slice(requested.as_bytes());

        let result = unsafe {
            ioctl_raw(file.as_raw_fd(), TUNSETIFF, &mut ifr as *mut _ as *mut libc::c_void)
        };
        if result < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EPERM) | Some(libc::EACCES) => TunError::PermissionDenied,
                Some(libc::EBUSY) => TunError::InvalidName(format!("{} is in use", requested)),
                _ => TunError::IoctlFailed(format!("TUNSETIFF: {}", err)),
            }
            .into());
        }

        // The kernel may have expanded a %d pattern or picked another name
        let name = name_from_bytes(&ifr.ifr_name);

        if config.persist {
            Self::tun_ioctl(&file, TUNSETPERSIST, 1, "TUNSETPERSIST")?;
        }
        if let Some(uid) = config.owner {
            Self::tun_ioctl(&file, TUNSETOWNER, uid as libc::c_ulong, "TUNSETOWNER")?;
        }
        if let Some(gid) = config.group {
            Self::tun_ioctl(&file, TUNSETGROUP, gid as libc::c_ulong, "TUNSETGROUP")?;
        }

        if config.non_blocking {
            set_nonblocking(file.as_raw_fd(), true)?;
        }

        let mut dev = LinuxTun {
            file: Some(file),
            name,
            mtu: config.mtu,
            mode: config.mode,
            non_blocking: config.non_blocking,
            state: DeviceState::Active,
        };
        dev.set_mtu(config.mtu)?;

        log::info!("{} device created: {}", dev.mode, dev.name);
        Ok(dev)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            log::info!("Closed {}", self.name);
        }
        self.state = DeviceState::Closed;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_open(self.state)?;
        check_read_buffer(buf.len(), self.frame_len())?;
        let n = read_fd(self.fd()?, buf)?;
        log::trace!("TUN read: {} bytes", n);
        Ok(n)
    }

    fn write(&mut self, packet: &[u8]) -> Result<()> {
        check_packet_len(packet.len(), self.mtu)?;
        check_open(self.state)?;
        let n = write_fd(self.fd()?, packet)?;
        if n != packet.len() {
            return Err(DeviceError::PartialWrite { written: n, expected: packet.len() });
        }
        log::trace!("TUN write: {} bytes", n);
        Ok(())
    }

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn set_mtu(&mut self, mtu: usize) -> Result<()> {
        validate_mtu(mtu)?;
        check_open(self.state)?;
        ControlSocket::open()?.set_mtu(&self.name, mtu)?;
        self.mtu = mtu;
        Ok(())
    }

    fn up(&mut self) -> Result<()> {
        check_open(self.state)?;
        ControlSocket::open()?.set_up(&self.name, true)
    }

    fn down(&mut self) -> Result<()> {
        check_open(self.state)?;
        ControlSocket::open()?.set_up(&self.name, false)
    }

    #[inline]
    fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    fn state(&self) -> DeviceState {
        self.state
    }
}

impl AsRawFd for LinuxTun {
    /// Returns -1 once the device is closed.
    fn as_raw_fd(&self) -> RawFd {
        self.fd().unwrap_or(-1)
    }
}
