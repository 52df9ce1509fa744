//! # Constants
//!
//! Shared defaults for devices and routing.

use std::time::Duration;

/// Default interface MTU
pub const DEFAULT_MTU: usize = 1500;

/// Default capacity of each queue in the queue-based backend
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Bounded wait for an overlapped write to complete
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Length of the address-family header utun prepends to every packet
pub const AF_HEADER_LEN: usize = 4;

/// Ethernet header carried in front of the payload in link mode
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Blind delete-default attempts before installing the VPN default route.
/// macOS may carry more than one default entry.
#[cfg(target_os = "macos")]
pub const DEFAULT_ROUTE_DELETE_ATTEMPTS: usize = 3;
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_ROUTE_DELETE_ATTEMPTS: usize = 1;
