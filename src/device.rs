//! # Device Contract
//!
//! The operation set every backend implements. Exactly one backend is
//! compiled behind [`crate::TunDevice`] per target; the others that build on
//! the host are still usable directly.

use crate::config::{DeviceConfig, Mode};
use crate::error::{DeviceError, Result};

/// Lifecycle of an open device. `Closed` and `Inactive` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Allocated but not yet carrying traffic (queue backend before activation)
    Created,
    Active,
    /// The peer ended the session; only counters remain observable
    Inactive,
    Closed,
}

impl DeviceState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviceState::Closed | DeviceState::Inactive)
    }
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub packets_read: u64,
    pub packets_written: u64,
}

impl DeviceStats {
    #[inline]
    pub(crate) fn record_read(&mut self, n: usize) {
        self.bytes_read += n as u64;
        self.packets_read += 1;
    }

    #[inline]
    pub(crate) fn record_write(&mut self, n: usize) {
        self.bytes_written += n as u64;
        self.packets_written += 1;
    }
}

/// A virtual network interface carrying one packet per `read`/`write`.
pub trait Device: Sized {
    /// Allocate the interface described by `config`.
    fn open(config: &DeviceConfig) -> Result<Self>;

    /// Release the transport. Later I/O fails with [`DeviceError::Closed`].
    fn close(&mut self);

    /// Read one packet into `buf`, returning its length.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write one packet. Packets longer than the MTU are rejected up front.
    fn write(&mut self, packet: &[u8]) -> Result<()>;

    fn name(&self) -> &str;

    fn mtu(&self) -> usize;

    fn set_mtu(&mut self, mtu: usize) -> Result<()>;

    fn up(&mut self) -> Result<()>;

    fn down(&mut self) -> Result<()>;

    fn mode(&self) -> Mode;

    fn state(&self) -> DeviceState;
}

/// Reject packets that cannot fit the interface MTU.
#[inline]
pub(crate) fn check_packet_len(len: usize, mtu: usize) -> Result<()> {
    if len > mtu {
        return Err(DeviceError::PacketTooLarge { size: len, mtu });
    }
    Ok(())
}

/// Reject read buffers smaller than one full frame; descriptor reads
/// truncate without reporting it.
#[inline]
pub(crate) fn check_read_buffer(len: usize, frame: usize) -> Result<()> {
    if len < frame {
        return Err(DeviceError::BufferTooSmall { needed: frame, got: len });
    }
    Ok(())
}

/// Reject I/O on a device in a terminal state.
#[inline]
pub(crate) fn check_open(state: DeviceState) -> Result<()> {
    if state.is_terminal() {
        return Err(DeviceError::Closed);
    }
    Ok(())
}

pub(crate) fn validate_mtu(mtu: usize) -> Result<()> {
    if mtu == 0 || mtu > u16::MAX as usize {
        return Err(DeviceError::InvalidParameter(format!("mtu out of range: {}", mtu)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_len_check() {
        assert!(check_packet_len(1500, 1500).is_ok());
        assert!(matches!(
            check_packet_len(1501, 1500),
            Err(DeviceError::PacketTooLarge { size: 1501, mtu: 1500 })
        ));
    }

    #[test]
    fn test_read_buffer_check() {
        assert!(check_read_buffer(1500, 1500).is_ok());
        assert!(matches!(
            check_read_buffer(8, 1500),
            Err(DeviceError::BufferTooSmall { needed: 1500, got: 8 })
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeviceState::Closed.is_terminal());
        assert!(DeviceState::Inactive.is_terminal());
        assert!(!DeviceState::Created.is_terminal());
        assert!(check_open(DeviceState::Active).is_ok());
        assert!(matches!(check_open(DeviceState::Inactive), Err(DeviceError::Closed)));
    }

    #[test]
    fn test_stats_accumulate() {
        let mut stats = DeviceStats::default();
        stats.record_read(100);
        stats.record_read(50);
        stats.record_write(20);
        assert_eq!(stats.bytes_read, 150);
        assert_eq!(stats.packets_read, 2);
        assert_eq!(stats.packets_written, 1);
    }
}
