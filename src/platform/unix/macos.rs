//! # macOS utun Device
//!
//! utun interfaces are created by connecting a `PF_SYSTEM` control socket
//! to the `com.apple.net.utun_control` kernel control. Every packet on the
//! socket carries a 4-byte address-family header which is added on write and
//! stripped on read, so callers only ever see raw IP packets.

use super::ifreq::{ioctl_raw, name_from_bytes, ControlSocket, IFNAMSIZ};
use super::{interface_unit, retry_eintr, set_nonblocking};
use crate::config::{DeviceConfig, Mode};
use crate::constants::AF_HEADER_LEN;
use crate::device::{
    check_open, check_packet_len, check_read_buffer, validate_mtu, Device, DeviceState,
};
use crate::error::{DeviceError, Result, TunError};
use crate::packet::encode_af_header;
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

const UTUN_CONTROL_NAME: &[u8] = b"com.apple.net.utun_control";
const CTLIOCGINFO: u64 = 0xc064_4e03;
const SYSPROTO_CONTROL: libc::c_int = 2;
const AF_SYS_CONTROL: u16 = 2;
const UTUN_OPT_IFNAME: libc::c_int = 2;
const MAX_KCTL_NAME: usize = 96;

#[repr(C)]
struct CtlInfo {
    ctl_id: u32,
    ctl_name: [libc::c_char; MAX_KCTL_NAME],
}

#[repr(C)]
struct SockaddrCtl {
    sc_len: u8,
    sc_family: u8,
    ss_sysaddr: u16,
    sc_id: u32,
    sc_unit: u32,
    sc_reserved: [u32; 5],
}

/// Point-to-point utun interface
pub struct Utun {
    fd: Option<OwnedFd>,
    name: String,
    unit: u32,
    mtu: usize,
    non_blocking: bool,
    state: DeviceState,
}

impl Utun {
    /// Kernel-assigned unit number (`utun7` → 7).
    #[inline]
    pub fn unit(&self) -> u32 {
        self.unit
    }

    fn fd(&self) -> Result<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd()).ok_or(DeviceError::Closed)
    }

    fn control_socket() -> Result<OwnedFd> {
        let fd = unsafe { libc::socket(libc::PF_SYSTEM, libc::SOCK_DGRAM, SYSPROTO_CONTROL) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EPERM) | Some(libc::EACCES) => TunError::PermissionDenied,
                _ => TunError::OpenFailed(format!("PF_SYSTEM socket: {}", err)),
            }
            .into());
        }
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    fn control_id(fd: RawFd) -> Result<u32> {
        let mut info = CtlInfo { ctl_id: 0, ctl_name: [0; MAX_KCTL_NAME] };
        for (dst, &src) in info.ctl_name.iter_mut().zip(UTUN_CONTROL_NAME) {
            *dst = src as libc::c_char;
        }

        let result = unsafe { ioctl_raw(fd, CTLIOCGINFO, &mut info as *mut _ as *mut libc::c_void) };
        if result < 0 {
            let err = io::Error::last_os_error();
            return Err(TunError::IoctlFailed(format!("CTLIOCGINFO: {}", err)).into());
        }
        Ok(info.ctl_id)
    }

    /// `sc_unit` is one past the utun number; zero lets the kernel choose.
    fn connect(fd: RawFd, ctl_id: u32, unit: Option<u32>) -> Result<()> {
        let addr = SockaddrCtl {
            sc_len: mem::size_of::<SockaddrCtl>() as u8,
            sc_family: libc::AF_SYSTEM as u8,
            ss_sysaddr: AF_SYS_CONTROL,
            sc_id: ctl_id,
            sc_unit: unit.map(|u| u + 1).unwrap_or(0),
            sc_reserved: [0; 5],
        };

        let result = unsafe {
            libc::connect(
                fd,
                &addr as *const SockaddrCtl as *const libc::sockaddr,
                mem::size_of::<SockaddrCtl>() as libc::socklen_t,
            )
        };
        if result < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EPERM) | Some(libc::EACCES) => TunError::PermissionDenied,
                Some(libc::EBUSY) => TunError::InvalidName(format!(
                    "utun{} is in use",
                    unit.unwrap_or_default()
                )),
                _ => TunError::OpenFailed(format!("connect utun control: {}", err)),
            }
            .into());
        }
        Ok(())
    }

    fn interface_name(fd: RawFd) -> Result<String> {
        let mut buf = [0u8; IFNAMSIZ];
        let mut len = buf.len() as libc::socklen_t;
        let result = unsafe {
            libc::getsockopt(
                fd,
                SYSPROTO_CONTROL,
                UTUN_OPT_IFNAME,
                buf.as_mut_ptr() as *mut libc::c_void,
                &mut len,
            )
        };
        if result < 0 {
            let err = io::Error::last_os_error();
            return Err(TunError::IoctlFailed(format!("UTUN_OPT_IFNAME: {}", err)).into());
        }
        Ok(name_from_bytes(&buf[..len as usize]))
    }
}

impl Device for Utun {
    fn open(config: &DeviceConfig) -> Result<Self> {
        validate_mtu(config.mtu)?;
        if config.mode == Mode::Link {
            return Err(TunError::Unsupported.into());
        }

        // An explicit name pins the unit; "utun" alone means any free unit
        let unit = match (&config.name, config.unit) {
            (Some(name), _) => match interface_unit(name) {
                Some(u) if name.starts_with("utun") => Some(u),
                None if name == "utun" => None,
                _ => return Err(TunError::InvalidName(name.clone()).into()),
            },
            (None, unit) => unit,
        };
        log::info!(
            "Creating utun device: {}",
            unit.map(|u| format!("utun{}", u)).unwrap_or_else(|| "utun (auto)".into())
        );

        let socket = Self::control_socket()?;
        let fd = socket.as_raw_fd();
        let ctl_id = Self::control_id(fd)?;
        Self::connect(fd, ctl_id, unit)?;

        let name = Self::interface_name(fd)?;
        let unit = interface_unit(&name)
            .ok_or_else(|| TunError::IoctlFailed(format!("unexpected interface name {}", name)))?;

        if config.non_blocking {
            set_nonblocking(fd, true)?;
        }

        let mut dev = Utun {
            fd: Some(socket),
            name,
            unit,
            mtu: config.mtu,
            non_blocking: config.non_blocking,
            state: DeviceState::Active,
        };
        dev.set_mtu(config.mtu)?;

        log::info!("utun device created: {} (non-blocking: {})", dev.name, dev.non_blocking);
        Ok(dev)
    }

    fn close(&mut self) {
        if self.fd.take().is_some() {
            log::info!("Closed {}", self.name);
        }
        self.state = DeviceState::Closed;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_open(self.state)?;
        check_read_buffer(buf.len(), self.mtu)?;
        let fd = self.fd()?;
        let mut header = [0u8; AF_HEADER_LEN];
        let mut iov = [
            libc::iovec { iov_base: header.as_mut_ptr() as *mut libc::c_void, iov_len: header.len() },
            libc::iovec { iov_base: buf.as_mut_ptr() as *mut libc::c_void, iov_len: buf.len() },
        ];

        let n = retry_eintr(|| unsafe { libc::readv(fd, iov.as_mut_ptr(), iov.len() as libc::c_int) })?;
        let payload = n.saturating_sub(AF_HEADER_LEN);
        log::trace!("utun read: {} bytes (family {})", payload, u32::from_be_bytes(header));
        Ok(payload)
    }

    fn write(&mut self, packet: &[u8]) -> Result<()> {
        check_packet_len(packet.len(), self.mtu)?;
        check_open(self.state)?;
        let fd = self.fd()?;

        let mut header = [0u8; AF_HEADER_LEN];
        encode_af_header(packet, &mut header)?;
        let iov = [
            libc::iovec { iov_base: header.as_ptr() as *mut libc::c_void, iov_len: header.len() },
            libc::iovec { iov_base: packet.as_ptr() as *mut libc::c_void, iov_len: packet.len() },
        ];

        let n = retry_eintr(|| unsafe { libc::writev(fd, iov.as_ptr(), iov.len() as libc::c_int) })?;
        let expected = packet.len() + AF_HEADER_LEN;
        if n != expected {
            return Err(DeviceError::PartialWrite {
                written: n.saturating_sub(AF_HEADER_LEN),
                expected: packet.len(),
            });
        }
        log::trace!("utun write: {} bytes", packet.len());
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
        Mode::Network
    }

    #[inline]
    fn state(&self) -> DeviceState {
        self.state
    }
}

impl AsRawFd for Utun {
    fn as_raw_fd(&self) -> RawFd {
        self.fd().unwrap_or(-1)
    }
}
