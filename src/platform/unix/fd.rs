//! # Externally Supplied Descriptor
//!
//! Device for managed VPN sessions where the OS creates the interface and
//! hands over an already-open descriptor. Address and MTU are applied by the
//! owning session object; the setters here only keep the books.

use super::{read_fd, set_nonblocking, write_fd};
use crate::config::{DeviceConfig, Mode};
use crate::device::{
    check_open, check_packet_len, check_read_buffer, validate_mtu, Device, DeviceState, DeviceStats,
};
use crate::error::{DeviceError, Result};
use std::io;
use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub struct FdDevice {
    fd: Option<OwnedFd>,
    name: String,
    mtu: usize,
    address: Option<(Ipv4Addr, Ipv4Addr)>,
    link_up: bool,
    state: DeviceState,
    stats: DeviceStats,
}

impl FdDevice {
    /// Take ownership of `fd`. The descriptor must be open; it is switched
    /// to non-blocking mode regardless of `config.non_blocking`.
    pub fn from_raw_fd(fd: RawFd, config: &DeviceConfig) -> Result<Self> {
        if fd < 0 {
            return Err(DeviceError::InvalidFileDescriptor(fd));
        }
        validate_mtu(config.mtu)?;

        if let Err(e) = set_nonblocking(fd, true) {
            return Err(match e.raw_os_error() {
                Some(libc::EBADF) => DeviceError::InvalidFileDescriptor(fd),
                _ => DeviceError::Io(e),
            });
        }

        let name = config.name.clone().unwrap_or_else(|| format!("fd{}", fd));
        log::info!("Adopted session descriptor {} as {}", fd, name);

        Ok(FdDevice {
            fd: Some(unsafe { OwnedFd::from_raw_fd(fd) }),
            name,
            mtu: config.mtu,
            address: None,
            link_up: true,
            state: DeviceState::Active,
            stats: DeviceStats::default(),
        })
    }

    /// Counters stay readable after the device goes inactive.
    #[inline]
    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Record the address the session object configured.
    pub fn set_address(&mut self, address: Ipv4Addr, netmask: Ipv4Addr) {
        log::debug!("{}: address {}/{} (advisory)", self.name, address, netmask);
        self.address = Some((address, netmask));
    }

    #[inline]
    pub fn address(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        self.address
    }

    #[inline]
    pub fn is_up(&self) -> bool {
        self.link_up
    }

    fn raw(&self) -> Result<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd()).ok_or(DeviceError::Closed)
    }

    fn go_inactive(&mut self) {
        log::info!("{}: session closed by peer, device inactive", self.name);
        self.fd = None;
        self.state = DeviceState::Inactive;
    }
}

impl Device for FdDevice {
    /// Uses `config.fd`, which must be set.
    fn open(config: &DeviceConfig) -> Result<Self> {
        let fd = config
            .fd
            .ok_or_else(|| DeviceError::InvalidParameter("no session descriptor supplied".into()))?;
        Self::from_raw_fd(fd, config)
    }

    fn close(&mut self) {
        if self.fd.take().is_some() {
            log::info!(
                "Closed {} (rx {} pkts/{} bytes, tx {} pkts/{} bytes)",
                self.name,
                self.stats.packets_read,
                self.stats.bytes_read,
                self.stats.packets_written,
                self.stats.bytes_written
            );
        }
        if self.state != DeviceState::Inactive {
            self.state = DeviceState::Closed;
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_open(self.state)?;
        check_read_buffer(buf.len(), self.mtu)?;
        match read_fd(self.raw()?, buf) {
            Ok(0) => {
                self.go_inactive();
                Err(DeviceError::Closed)
            }
            Ok(n) => {
                self.stats.record_read(n);
                log::trace!("Session read: {} bytes", n);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(DeviceError::WouldBlock),
            Err(e) => Err(DeviceError::Io(e)),
        }
    }

    fn write(&mut self, packet: &[u8]) -> Result<()> {
        check_packet_len(packet.len(), self.mtu)?;
        check_open(self.state)?;
        let n = write_fd(self.raw()?, packet)?;
        if n != packet.len() {
            return Err(DeviceError::PartialWrite { written: n, expected: packet.len() });
        }
        self.stats.record_write(n);
        log::trace!("Session write: {} bytes", n);
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
        log::debug!("{}: mtu {} (advisory)", self.name, mtu);
        self.mtu = mtu;
        Ok(())
    }

    fn up(&mut self) -> Result<()> {
        check_open(self.state)?;
        self.link_up = true;
        Ok(())
    }

    fn down(&mut self) -> Result<()> {
        check_open(self.state)?;
        self.link_up = false;
        Ok(())
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

impl AsRawFd for FdDevice {
    /// Returns -1 once the device is closed or inactive.
    fn as_raw_fd(&self) -> RawFd {
        self.raw().unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socket_pair() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], fds[1])
    }

    #[test]
    fn test_rejects_negative_and_missing_fd() {
        let config = DeviceConfig::default();
        assert!(matches!(
            FdDevice::from_raw_fd(-1, &config),
            Err(DeviceError::InvalidFileDescriptor(-1))
        ));
        assert!(matches!(FdDevice::open(&config), Err(DeviceError::InvalidParameter(_))));
    }

    /// A descriptor number at the soft limit, which the kernel never hands out.
    fn unallocatable_fd() -> RawFd {
        let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) }, 0);
        let fd = limit.rlim_cur.min(RawFd::MAX as libc::rlim_t) as RawFd;
        assert_eq!(unsafe { libc::fcntl(fd, libc::F_GETFD) }, -1);
        fd
    }

    #[test]
    fn test_rejects_closed_descriptor() {
        let fd = unallocatable_fd();
        assert!(matches!(
            FdDevice::open(&DeviceConfig::default().with_fd(fd)),
            Err(DeviceError::InvalidFileDescriptor(n)) if n == fd
        ));
    }

    #[test]
    fn test_short_read_buffer_rejected() {
        let (ours, peer) = socket_pair();
        let mut dev =
            FdDevice::open(&DeviceConfig::default().with_fd(ours).with_mtu(1280)).unwrap();
        assert_eq!(write_fd(peer, &[0x45; 40]).unwrap(), 40);

        let mut small = [0u8; 16];
        assert!(matches!(
            dev.read(&mut small),
            Err(DeviceError::BufferTooSmall { needed: 1280, got: 16 })
        ));
        let mut buf = [0u8; 1280];
        assert_eq!(dev.read(&mut buf).unwrap(), 40);
        unsafe { libc::close(peer) };
    }

    #[test]
    fn test_io_and_counters() {
        let (ours, peer) = socket_pair();
        let mut dev = FdDevice::open(&DeviceConfig::default().with_fd(ours)).unwrap();

        let mut buf = [0u8; 1500];
        assert!(matches!(dev.read(&mut buf), Err(DeviceError::WouldBlock)));

        dev.write(&[0x45, 0, 0, 4]).unwrap();
        let mut peer_buf = [0u8; 4];
        assert_eq!(read_fd(peer, &mut peer_buf).unwrap(), 4);

        assert_eq!(write_fd(peer, &[0x60, 1, 2]).unwrap(), 3);
        assert_eq!(dev.read(&mut buf).unwrap(), 3);

        let stats = dev.stats();
        assert_eq!((stats.packets_read, stats.bytes_read), (1, 3));
        assert_eq!((stats.packets_written, stats.bytes_written), (1, 4));

        dev.close();
        unsafe { libc::close(peer) };
    }

    #[test]
    fn test_zero_read_is_terminal() {
        let (ours, peer) = socket_pair();
        let mut dev = FdDevice::open(&DeviceConfig::default().with_fd(ours)).unwrap();
        unsafe { libc::close(peer) };

        let mut buf = [0u8; 1500];
        assert!(matches!(dev.read(&mut buf), Err(DeviceError::Closed)));
        assert_eq!(dev.state(), DeviceState::Inactive);
        assert_eq!(dev.as_raw_fd(), -1);

        assert!(matches!(dev.read(&mut buf), Err(DeviceError::Closed)));
        assert!(matches!(dev.write(&[0x45]), Err(DeviceError::Closed)));
        assert_eq!(dev.stats(), DeviceStats::default());

        dev.close();
        assert_eq!(dev.state(), DeviceState::Inactive);
    }

    #[test]
    fn test_mtu_and_address_bookkeeping() {
        let (ours, peer) = socket_pair();
        let mut dev =
            FdDevice::open(&DeviceConfig::default().with_fd(ours).with_mtu(1280)).unwrap();

        assert!(matches!(
            dev.write(&vec![0u8; 1281]),
            Err(DeviceError::PacketTooLarge { size: 1281, mtu: 1280 })
        ));
        dev.set_mtu(1400).unwrap();
        assert_eq!(dev.mtu(), 1400);

        dev.set_address(Ipv4Addr::new(10, 8, 0, 2), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(dev.address().map(|(a, _)| a), Some(Ipv4Addr::new(10, 8, 0, 2)));

        dev.down().unwrap();
        assert!(!dev.is_up());
        unsafe { libc::close(peer) };
    }
}
