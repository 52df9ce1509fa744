//! # TUN Device Facade
//!
//! One portable device type over whichever backend the target selects.
//! Callers see raw IP packets (or Ethernet frames in link mode) and the
//! same error taxonomy everywhere.

use crate::config::{DeviceConfig, Mode};
use crate::device::{Device, DeviceState};
use crate::error::{DeviceError, Result};
use crate::platform::Backend;

#[cfg(all(unix, not(target_os = "ios")))]
use std::os::unix::io::{AsRawFd, RawFd};

/// Portable virtual interface
pub struct TunDevice {
    inner: Backend,
}

impl TunDevice {
    /// Create the device described by `config`.
    pub fn create(config: &DeviceConfig) -> Result<Self> {
        let inner = Backend::open(config)?;
        Ok(TunDevice { inner })
    }

    /// Wrap an already-open backend.
    pub fn from_backend(inner: Backend) -> Self {
        TunDevice { inner }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    #[inline]
    pub fn mtu(&self) -> usize {
        self.inner.mtu()
    }

    pub fn set_mtu(&mut self, mtu: usize) -> Result<()> {
        log::debug!("{}: set mtu {}", self.inner.name(), mtu);
        self.inner.set_mtu(mtu)
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.inner.mode()
    }

    #[inline]
    pub fn state(&self) -> DeviceState {
        self.inner.state()
    }

    pub fn up(&mut self) -> Result<()> {
        self.inner.up()
    }

    pub fn down(&mut self) -> Result<()> {
        self.inner.down()
    }

    #[inline]
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    #[inline]
    pub fn write(&mut self, packet: &[u8]) -> Result<()> {
        self.inner.write(packet)
    }

    /// Read packets until the device has nothing more ready.
    ///
    /// Stops at the first `WouldBlock`; any other error is returned only if
    /// nothing was read yet.
    pub fn read_batch(&mut self, buffers: &mut [&mut [u8]]) -> Result<Vec<usize>> {
        let mut sizes = Vec::with_capacity(buffers.len());

        for buf in buffers.iter_mut() {
            match self.inner.read(buf) {
                Ok(n) => sizes.push(n),
                Err(DeviceError::WouldBlock) => break,
                Err(e) if sizes.is_empty() => return Err(e),
                Err(e) => {
                    log::debug!("Batch read stopped early: {}", e);
                    break;
                }
            }
        }

        Ok(sizes)
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    /// Platform backend, for operations outside the portable surface.
    #[inline]
    pub fn backend(&self) -> &Backend {
        &self.inner
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.inner
    }
}

impl Device for TunDevice {
    fn open(config: &DeviceConfig) -> Result<Self> {
        Self::create(config)
    }

    fn close(&mut self) {
        TunDevice::close(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        TunDevice::read(self, buf)
    }

    fn write(&mut self, packet: &[u8]) -> Result<()> {
        TunDevice::write(self, packet)
    }

    fn name(&self) -> &str {
        TunDevice::name(self)
    }

    fn mtu(&self) -> usize {
        TunDevice::mtu(self)
    }

    fn set_mtu(&mut self, mtu: usize) -> Result<()> {
        TunDevice::set_mtu(self, mtu)
    }

    fn up(&mut self) -> Result<()> {
        TunDevice::up(self)
    }

    fn down(&mut self) -> Result<()> {
        TunDevice::down(self)
    }

    fn mode(&self) -> Mode {
        TunDevice::mode(self)
    }

    fn state(&self) -> DeviceState {
        TunDevice::state(self)
    }
}

impl Drop for TunDevice {
    fn drop(&mut self) {
        self.inner.close();
    }
}

#[cfg(all(unix, not(target_os = "ios")))]
impl AsRawFd for TunDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
