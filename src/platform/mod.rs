//! # Platform Module
//!
//! Platform-specific backends with conditional compilation. [`Backend`] names
//! the one that [`crate::TunDevice`] wraps on the current target.

pub mod queue;

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

pub use queue::{ProviderHandle, QueueDevice};

#[cfg(unix)]
pub use unix::FdDevice;

#[cfg(target_os = "linux")]
pub type Backend = unix::LinuxTun;

#[cfg(target_os = "macos")]
pub type Backend = unix::Utun;

#[cfg(windows)]
pub type Backend = windows::TapDevice;

#[cfg(target_os = "ios")]
pub type Backend = queue::QueueDevice;

/// Android and any other unix receive their descriptor from the OS session.
#[cfg(all(unix, not(any(target_os = "linux", target_os = "macos", target_os = "ios"))))]
pub type Backend = unix::FdDevice;
