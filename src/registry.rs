//! # Device Registry
//!
//! Owns open devices on behalf of callers that can only hold an integer.
//! Every entry point validates the handle and reports failures as
//! [`ErrorCode`]s; the registry itself is the context callers pass around.

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::error::ErrorCode;
use std::collections::HashMap;

/// Opaque device handle. Zero is never issued.
pub type Handle = u32;

pub struct DeviceRegistry<D: Device> {
    devices: HashMap<Handle, D>,
    next: Handle,
}

impl<D: Device> Default for DeviceRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Device> DeviceRegistry<D> {
    pub fn new() -> Self {
        DeviceRegistry { devices: HashMap::new(), next: 1 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.devices.contains_key(&handle)
    }

    /// Open a device and register it.
    pub fn open(&mut self, config: &DeviceConfig) -> Result<Handle, ErrorCode> {
        let device = D::open(config).map_err(|e| {
            log::warn!("Device open failed: {}", e);
            ErrorCode::from(&e)
        })?;
        self.insert(device)
    }

    /// Register an already-open device.
    pub fn insert(&mut self, device: D) -> Result<Handle, ErrorCode> {
        let handle = self.allocate()?;
        log::debug!("Registered {} as handle {}", device.name(), handle);
        self.devices.insert(handle, device);
        Ok(handle)
    }

    /// Skips zero and handles still in use once the counter wraps.
    fn allocate(&mut self) -> Result<Handle, ErrorCode> {
        if self.devices.len() >= (Handle::MAX - 1) as usize {
            return Err(ErrorCode::OutOfMemory);
        }
        loop {
            let candidate = self.next;
            self.next = self.next.wrapping_add(1);
            if candidate != 0 && !self.devices.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Run `f` against the device behind `handle`.
    pub fn with<R>(&mut self, handle: Handle, f: impl FnOnce(&mut D) -> R) -> Result<R, ErrorCode> {
        self.devices
            .get_mut(&handle)
            .map(f)
            .ok_or(ErrorCode::InvalidParameter)
    }

    pub fn read(&mut self, handle: Handle, buf: &mut [u8]) -> Result<usize, ErrorCode> {
        self.with(handle, |dev| dev.read(buf))?
            .map_err(|e| ErrorCode::from_read_error(&e))
    }

    pub fn write(&mut self, handle: Handle, packet: &[u8]) -> Result<(), ErrorCode> {
        self.with(handle, |dev| dev.write(packet))?
            .map_err(|e| ErrorCode::from_write_error(&e))
    }

    pub fn mtu(&mut self, handle: Handle) -> Result<usize, ErrorCode> {
        self.with(handle, |dev| dev.mtu())
    }

    pub fn set_mtu(&mut self, handle: Handle, mtu: usize) -> Result<(), ErrorCode> {
        self.with(handle, |dev| dev.set_mtu(mtu))?
            .map_err(|e| ErrorCode::from(&e))
    }

    /// Close and forget the device. The handle becomes invalid.
    pub fn close(&mut self, handle: Handle) -> Result<(), ErrorCode> {
        let mut device = self.devices.remove(&handle).ok_or(ErrorCode::InvalidParameter)?;
        device.close();
        log::debug!("Released handle {}", handle);
        Ok(())
    }

    /// Close every registered device.
    pub fn close_all(&mut self) {
        for (_, mut device) in self.devices.drain() {
            device.close();
        }
    }
}

impl<D: Device> Drop for DeviceRegistry<D> {
    fn drop(&mut self) {
        self.close_all();
    }
}
