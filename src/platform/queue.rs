//! # Queue-Backed Device
//!
//! Device for sandboxed packet-tunnel providers that never hand out a
//! descriptor. Packets move through two bounded queues; the provider side
//! ([`ProviderHandle`]) pushes received packets in and drains outgoing ones.

use crate::config::{DeviceConfig, Mode};
use crate::device::{check_packet_len, validate_mtu, Device, DeviceState, DeviceStats};
use crate::error::{DeviceError, Result};
use crate::queue::{Oversized, PacketQueue, QueueFull};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Shared {
    /// Provider → device
    inbound: PacketQueue,
    /// Device → provider
    outbound: PacketQueue,
    active: AtomicBool,
    closed: AtomicBool,
}

/// Device whose only transport is a pair of packet queues
pub struct QueueDevice {
    shared: Arc<Shared>,
    name: String,
    mtu: usize,
    mode: Mode,
    state: DeviceState,
    stats: DeviceStats,
}

impl QueueDevice {
    /// Make the device accept traffic.
    pub fn activate(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(DeviceError::Closed);
        }
        self.shared.active.store(true, Ordering::Release);
        self.state = DeviceState::Active;
        log::info!("Queue device {} active", self.name);
        Ok(())
    }

    /// Stop accepting traffic. Queued packets are kept.
    pub fn deactivate(&mut self) {
        if self.state == DeviceState::Active {
            self.shared.active.store(false, Ordering::Release);
            self.state = DeviceState::Created;
            log::info!("Queue device {} inactive", self.name);
        }
    }

    /// Handle for the external delivery mechanism.
    pub fn provider(&self) -> ProviderHandle {
        ProviderHandle { shared: Arc::clone(&self.shared) }
    }

    #[inline]
    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != DeviceState::Active {
            return Err(DeviceError::Closed);
        }
        Ok(())
    }
}

impl Device for QueueDevice {
    fn open(config: &DeviceConfig) -> Result<Self> {
        validate_mtu(config.mtu)?;
        if config.queue_capacity == 0 {
            return Err(DeviceError::InvalidParameter("queue capacity must be positive".into()));
        }

        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("utun{}", config.unit.unwrap_or(0)));
        log::info!(
            "Opening queue device {} (capacity {} per direction)",
            name,
            config.queue_capacity
        );

        Ok(QueueDevice {
            shared: Arc::new(Shared {
                inbound: PacketQueue::new(config.queue_capacity),
                outbound: PacketQueue::new(config.queue_capacity),
                active: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            name,
            mtu: config.mtu,
            mode: config.mode,
            state: DeviceState::Created,
            stats: DeviceStats::default(),
        })
    }

    fn close(&mut self) {
        if self.state == DeviceState::Closed {
            return;
        }
        self.shared.active.store(false, Ordering::Release);
        self.shared.closed.store(true, Ordering::Release);
        let freed = self.shared.inbound.clear() + self.shared.outbound.clear();
        self.state = DeviceState::Closed;
        log::info!("Closed queue device {} ({} queued packets freed)", self.name, freed);
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_active()?;
        match self.shared.inbound.pop_within(buf.len()) {
            Ok(Some(packet)) => {
                let n = packet.len();
                buf[..n].copy_from_slice(&packet);
                self.stats.record_read(n);
                log::trace!("Queue read: {} bytes", n);
                Ok(n)
            }
            Ok(None) => Err(DeviceError::WouldBlock),
            Err(Oversized(needed)) => Err(DeviceError::BufferTooSmall { needed, got: buf.len() }),
        }
    }

    fn write(&mut self, packet: &[u8]) -> Result<()> {
        check_packet_len(packet.len(), self.mtu)?;
        self.ensure_active()?;
        self.shared
            .outbound
            .push(packet.to_vec())
            .map_err(|QueueFull(_)| DeviceError::QueueFull)?;
        self.stats.record_write(packet.len());
        log::trace!("Queue write: {} bytes", packet.len());
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
        self.mtu = mtu;
        Ok(())
    }

    fn up(&mut self) -> Result<()> {
        self.activate()
    }

    fn down(&mut self) -> Result<()> {
        self.deactivate();
        Ok(())
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

impl Drop for QueueDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Provider side of a [`QueueDevice`]
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    shared: Arc<Shared>,
}

impl ProviderHandle {
    /// Hand a packet received from the OS to the device.
    pub fn deliver(&self, packet: Vec<u8>) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(DeviceError::Closed);
        }
        self.shared
            .inbound
            .push(packet)
            .map_err(|QueueFull(_)| DeviceError::QueueFull)
    }

    /// Take the next packet the device wrote, if any.
    pub fn take(&self) -> Option<Vec<u8>> {
        self.shared.outbound.pop()
    }

    /// Drain everything the device has written so far.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.take()).collect()
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn pending_outbound(&self) -> usize {
        self.shared.outbound.len()
    }
}
