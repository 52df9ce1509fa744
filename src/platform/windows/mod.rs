//! # Windows Platform Module
//!
//! TAP-Windows adapter discovery and the overlapped-I/O device on top of it.
//! Requires the TAP driver to be installed and Administrator privileges.

pub mod adapter;
pub mod tap;

pub use adapter::{find_tap_adapter, list_tap_adapters, TapAdapter};
pub use tap::TapDevice;
