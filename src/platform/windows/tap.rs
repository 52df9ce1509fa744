//! # Windows TAP Device
//!
//! Overlapped-handle device on the TAP-Windows driver. Reads and writes each
//! own an event so a pending read never blocks a write. Frames are link layer.

use super::adapter::{find_tap_adapter, wide, TapAdapter};
use crate::config::{DeviceConfig, Mode};
use crate::constants::WRITE_TIMEOUT;
use crate::device::{check_open, check_packet_len, validate_mtu, Device, DeviceState};
use crate::error::{DeviceError, Result, TunError};
use std::ffi::c_void;
use std::io;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_IO_PENDING, GENERIC_READ,
    GENERIC_WRITE, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, WriteFile, FILE_ATTRIBUTE_SYSTEM, FILE_FLAG_OVERLAPPED,
    FILE_SHARE_NONE, OPEN_EXISTING,
};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};
use windows::Win32::System::IO::{CancelIo, DeviceIoControl, GetOverlappedResult, OVERLAPPED};

const fn tap_control_code(function: u32) -> u32 {
    // CTL_CODE(FILE_DEVICE_UNKNOWN, function, METHOD_BUFFERED, FILE_ANY_ACCESS)
    (0x22 << 16) | (function << 2)
}

const TAP_IOCTL_GET_MAC: u32 = tap_control_code(1);
const TAP_IOCTL_SET_MEDIA_STATUS: u32 = tap_control_code(6);

fn win_error(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(e.code().0 & 0xFFFF)
}

/// Owned kernel handle
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

struct Handles {
    device: OwnedHandle,
    read_event: OwnedHandle,
    write_event: OwnedHandle,
}

/// TAP-Windows interface
pub struct TapDevice {
    handles: Option<Handles>,
    adapter: TapAdapter,
    mac: [u8; 6],
    mtu: usize,
    state: DeviceState,
}

// The handles are plain kernel object references with no thread affinity
unsafe impl Send for TapDevice {}

impl TapDevice {
    #[inline]
    pub fn guid(&self) -> &str {
        &self.adapter.guid
    }

    #[inline]
    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn handles(&self) -> Result<&Handles> {
        self.handles.as_ref().ok_or(DeviceError::Closed)
    }

    fn control(device: HANDLE, code: u32, input: &[u8], output: &mut [u8], what: &str) -> Result<()> {
        let mut returned = 0u32;
        unsafe {
            DeviceIoControl(
                device,
                code,
                Some(input.as_ptr() as *const c_void),
                input.len() as u32,
                Some(output.as_mut_ptr() as *mut c_void),
                output.len() as u32,
                Some(&mut returned as *mut u32),
                None,
            )
        }
        .map_err(|e| DeviceError::ConfigFailed(format!("{}: {}", what, e)))
    }

    fn set_media_status(&self, connected: bool) -> Result<()> {
        let device = self.handles()?.device.0;
        let status = (connected as u32).to_le_bytes();
        let mut out = [0u8; 4];
        Self::control(device, TAP_IOCTL_SET_MEDIA_STATUS, &status, &mut out, "TAP_IOCTL_SET_MEDIA_STATUS")?;
        log::info!(
            "{}: media {}",
            self.adapter.name,
            if connected { "connected" } else { "disconnected" }
        );
        Ok(())
    }

    fn event() -> Result<OwnedHandle> {
        let event = unsafe { CreateEventW(None, true, false, None) }
            .map_err(|e| TunError::OpenFailed(format!("CreateEventW: {}", e)))?;
        Ok(OwnedHandle(event))
    }

    /// Complete an overlapped transfer, waiting at most `timeout_ms`.
    fn finish(device: HANDLE, overlapped: &OVERLAPPED, event: HANDLE, timeout_ms: u32) -> Result<usize> {
        let wait = unsafe { WaitForSingleObject(event, timeout_ms) };
        if wait == WAIT_TIMEOUT {
            let mut ignored = 0u32;
            unsafe {
                let _ = CancelIo(device);
                // The buffer stays borrowed until the cancellation lands
                let _ = GetOverlappedResult(device, overlapped, &mut ignored, true);
            }
            return Err(DeviceError::Timeout);
        }
        if wait != WAIT_OBJECT_0 {
            return Err(io::Error::last_os_error().into());
        }

        let mut transferred = 0u32;
        unsafe { GetOverlappedResult(device, overlapped, &mut transferred, false) }
            .map_err(win_error)?;
        Ok(transferred as usize)
    }
}

/// Mark the media connected, then read the adapter MAC.
fn bring_up<F>(mut control: F) -> Result<[u8; 6]>
where
    F: FnMut(u32, &[u8], &mut [u8], &str) -> Result<()>,
{
    let mut out = [0u8; 4];
    control(
        TAP_IOCTL_SET_MEDIA_STATUS,
        &1u32.to_le_bytes(),
        &mut out,
        "TAP_IOCTL_SET_MEDIA_STATUS",
    )?;
    let mut mac = [0u8; 6];
    control(TAP_IOCTL_GET_MAC, &[], &mut mac, "TAP_IOCTL_GET_MAC")?;
    Ok(mac)
}

impl Device for TapDevice {
    fn open(config: &DeviceConfig) -> Result<Self> {
        validate_mtu(config.mtu)?;
        let adapter = find_tap_adapter(config.name.as_deref())?;
        log::info!("Opening TAP adapter {} ({})", adapter.name, adapter.guid);

        let path = wide(&adapter.device_path());
        let device = unsafe {
            CreateFileW(
                PCWSTR(path.as_ptr()),
                (GENERIC_READ | GENERIC_WRITE).0,
                FILE_SHARE_NONE,
                None,
                OPEN_EXISTING,
                FILE_ATTRIBUTE_SYSTEM | FILE_FLAG_OVERLAPPED,
                HANDLE::default(),
            )
        }
        .map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                TunError::PermissionDenied
            } else if e.code() == ERROR_FILE_NOT_FOUND.to_hresult() {
                TunError::DeviceNotFound(adapter.device_path())
            } else {
                TunError::OpenFailed(format!("{}: {}", adapter.device_path(), e))
            }
        })?;
        let device = OwnedHandle(device);

        let mut dev = TapDevice {
            handles: Some(Handles {
                device,
                read_event: Self::event()?,
                write_event: Self::event()?,
            }),
            adapter,
            mac: [0; 6],
            mtu: config.mtu,
            state: DeviceState::Active,
        };
        let device = dev.handles()?.device.0;
        dev.mac = bring_up(|code, input, output, what| {
            Self::control(device, code, input, output, what)
        })?;
        log::info!("{}: media connected", dev.adapter.name);

        log::info!(
            "TAP device opened: {} (mac {})",
            dev.adapter.name,
            dev.mac.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
        );
        Ok(dev)
    }

    fn close(&mut self) {
        if self.handles.is_some() {
            let _ = self.set_media_status(false);
            self.handles = None;
            log::info!("Closed {}", self.adapter.name);
        }
        self.state = DeviceState::Closed;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_open(self.state)?;
        let handles = self.handles()?;
        let mut overlapped = OVERLAPPED { hEvent: handles.read_event.0, ..Default::default() };
        let mut n = 0u32;

        let started = unsafe {
            ReadFile(
                handles.device.0,
                Some(buf),
                Some(&mut n as *mut u32),
                Some(&mut overlapped as *mut OVERLAPPED),
            )
        };
        let n = match started {
            Ok(()) => n as usize,
            Err(e) if e.code() == ERROR_IO_PENDING.to_hresult() => {
                Self::finish(handles.device.0, &overlapped, handles.read_event.0, INFINITE)?
            }
            Err(e) => return Err(DeviceError::Io(win_error(e))),
        };
        log::trace!("TAP read: {} bytes", n);
        Ok(n)
    }

    fn write(&mut self, packet: &[u8]) -> Result<()> {
        check_packet_len(packet.len(), self.mtu)?;
        check_open(self.state)?;
        let handles = self.handles()?;
        let mut overlapped = OVERLAPPED { hEvent: handles.write_event.0, ..Default::default() };
        let mut n = 0u32;

        let started = unsafe {
            WriteFile(
                handles.device.0,
                Some(packet),
                Some(&mut n as *mut u32),
                Some(&mut overlapped as *mut OVERLAPPED),
            )
        };
        let n = match started {
            Ok(()) => n as usize,
            Err(e) if e.code() == ERROR_IO_PENDING.to_hresult() => Self::finish(
                handles.device.0,
                &overlapped,
                handles.write_event.0,
                WRITE_TIMEOUT.as_millis() as u32,
            )?,
            Err(e) => return Err(DeviceError::Io(win_error(e))),
        };
        if n != packet.len() {
            return Err(DeviceError::PartialWrite { written: n, expected: packet.len() });
        }
        log::trace!("TAP write: {} bytes", n);
        Ok(())
    }

    #[inline]
    fn name(&self) -> &str {
        &self.adapter.name
    }

    #[inline]
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn set_mtu(&mut self, mtu: usize) -> Result<()> {
        validate_mtu(mtu)?;
        check_open(self.state)?;
        self.mtu = mtu;
        Ok(())
    }

    fn up(&mut self) -> Result<()> {
        check_open(self.state)?;
        self.set_media_status(true)
    }

    fn down(&mut self) -> Result<()> {
        check_open(self.state)?;
        self.set_media_status(false)
    }

    #[inline]
    fn mode(&self) -> Mode {
        Mode::Link
    }

    #[inline]
    fn state(&self) -> DeviceState {
        self.state
    }
}

impl Drop for TapDevice {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_codes() {
        assert_eq!(TAP_IOCTL_GET_MAC, 0x0022_0004);
        assert_eq!(TAP_IOCTL_SET_MEDIA_STATUS, 0x0022_0018);
    }

    #[test]
    fn test_bring_up_connects_media_before_mac_query() {
        let mut calls = Vec::new();
        let mac = bring_up(|code, input, output, _| {
            calls.push((code, input.to_vec()));
            if code == TAP_IOCTL_GET_MAC {
                output.copy_from_slice(&[0x00, 0xff, 0x10, 0x20, 0x30, 0x40]);
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(
            calls,
            vec![
                (TAP_IOCTL_SET_MEDIA_STATUS, vec![1, 0, 0, 0]),
                (TAP_IOCTL_GET_MAC, vec![]),
            ]
        );
        assert_eq!(mac, [0x00, 0xff, 0x10, 0x20, 0x30, 0x40]);
    }

    #[test]
    fn test_bring_up_stops_when_media_refused() {
        let mut calls = 0;
        let result = bring_up(|_, _, _, what| {
            calls += 1;
            Err(DeviceError::ConfigFailed(what.to_string()))
        });
        assert!(matches!(result, Err(DeviceError::ConfigFailed(_))));
        assert_eq!(calls, 1);
    }
}
