//! # tunbridge - VPN Device I/O Boundary
//!
//! A uniform packet interface over OS virtual network devices, plus a route
//! manager that points the default route at the VPN and puts it back:
//! - Linux `/dev/net/tun` (TUN or TAP)
//! - macOS utun kernel-control sockets
//! - Windows TAP driver with overlapped I/O
//! - Queue-fed devices for sandboxed packet-tunnel providers
//! - Descriptors handed over by a managed VPN session
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── device.rs       # Device trait, state, counters
//! ├── tun.rs          # TunDevice facade over the target's backend
//! ├── queue.rs        # Bounded packet queue
//! ├── registry.rs     # Integer handles for foreign callers
//! ├── platform/       # Backends
//! │   ├── queue.rs    # Queue-fed device
//! │   ├── unix/       # Linux, macOS, external descriptor
//! │   └── windows/    # TAP adapter discovery and device
//! ├── routing/        # Route manager, commands, system table
//! └── cli/            # Command-line interface
//! ```

pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod packet;
pub mod platform;
pub mod queue;
pub mod registry;
pub mod routing;

#[cfg(any(unix, windows))]
pub mod cli;
#[cfg(any(unix, windows))]
pub mod tun;

pub use config::{netmask_to_prefix, prefix_to_netmask, Config, ConfigError, DeviceConfig, Mode};
pub use constants::*;
pub use device::{Device, DeviceState, DeviceStats};
pub use error::{DeviceError, ErrorCode, Result, RouteError, RouteResult, TunError};
pub use platform::{ProviderHandle, QueueDevice};
pub use queue::PacketQueue;
pub use registry::{DeviceRegistry, Handle};
pub use routing::{RouteManager, RoutePhase, RouteTable, SystemRouteTable};

#[cfg(unix)]
pub use platform::FdDevice;

#[cfg(any(unix, windows))]
pub use tun::TunDevice;
