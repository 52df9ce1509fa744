//! # Error Module
//!
//! Error taxonomy for device I/O and route management, plus the stable
//! integer codes handed to foreign callers.

use std::fmt;
use std::io;
use std::net::Ipv4Addr;

// ═══════════════════════════════════════════════════════════════════════════
// DEVICE ERRORS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum DeviceError {
    /// The device could not be created; never retried
    Create(TunError),
    /// Non-blocking I/O had nothing to do; poll and retry
    WouldBlock,
    /// Device closed, or the managed session went inactive
    Closed,
    BufferTooSmall { needed: usize, got: usize },
    PacketTooLarge { size: usize, mtu: usize },
    /// Outbound queue at capacity; poll and retry
    QueueFull,
    PartialWrite { written: usize, expected: usize },
    /// Bounded wait on an overlapped write expired
    Timeout,
    InvalidFileDescriptor(i32),
    InvalidParameter(String),
    /// A single control call (MTU, flags, media status) failed
    ConfigFailed(String),
    Io(io::Error),
}

#[derive(Debug)]
pub enum TunError {
    OpenFailed(String),
    IoctlFailed(String),
    DeviceNotFound(String),
    PermissionDenied,
    InvalidName(String),
    Unsupported,
}

impl DeviceError {
    /// Steady-state backpressure signals the caller is expected to poll on.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::WouldBlock | DeviceError::QueueFull)
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Create(e) => write!(f, "device creation failed: {}", e),
            DeviceError::WouldBlock => write!(f, "operation would block"),
            DeviceError::Closed => write!(f, "device is closed or inactive"),
            DeviceError::BufferTooSmall { needed, got } => {
                write!(f, "buffer too small: need {} bytes, got {}", needed, got)
            }
            DeviceError::PacketTooLarge { size, mtu } => {
                write!(f, "packet too large: {} bytes exceeds MTU {}", size, mtu)
            }
            DeviceError::QueueFull => write!(f, "packet queue full"),
            DeviceError::PartialWrite { written, expected } => {
                write!(f, "partial write: {} of {} bytes", written, expected)
            }
            DeviceError::Timeout => write!(f, "I/O timed out"),
            DeviceError::InvalidFileDescriptor(fd) => write!(f, "invalid file descriptor: {}", fd),
            DeviceError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            DeviceError::ConfigFailed(msg) => write!(f, "configuration failed: {}", msg),
            DeviceError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl fmt::Display for TunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunError::OpenFailed(msg) => write!(f, "open failed: {}", msg),
            TunError::IoctlFailed(msg) => write!(f, "ioctl failed: {}", msg),
            TunError::DeviceNotFound(what) => write!(f, "device not found: {}", what),
            TunError::PermissionDenied => write!(f, "permission denied"),
            TunError::InvalidName(name) => write!(f, "invalid interface name: {}", name),
            TunError::Unsupported => write!(f, "unsupported on this platform"),
        }
    }
}

impl From<io::Error> for DeviceError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => DeviceError::WouldBlock,
            _ => DeviceError::Io(e),
        }
    }
}

impl From<TunError> for DeviceError {
    fn from(e: TunError) -> Self {
        DeviceError::Create(e)
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ═══════════════════════════════════════════════════════════════════════════
// ROUTE ERRORS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum RouteError {
    /// A routing command ran and reported failure
    Command { command: String, stderr: String },
    /// The default route could not be queried
    QueryFailed(String),
    /// Neither the primary nor the fallback default-route form succeeded
    InstallFailed(String),
    /// Netmask with a hole in it
    InvalidNetmask(Ipv4Addr),
    Io(io::Error),
}

impl std::error::Error for RouteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouteError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Command { command, stderr } => {
                write!(f, "`{}` failed: {}", command, stderr.trim())
            }
            RouteError::QueryFailed(msg) => write!(f, "default route query failed: {}", msg),
            RouteError::InstallFailed(msg) => write!(f, "route installation failed: {}", msg),
            RouteError::InvalidNetmask(mask) => write!(f, "non-contiguous netmask: {}", mask),
            RouteError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl From<io::Error> for RouteError {
    fn from(e: io::Error) -> Self {
        RouteError::Io(e)
    }
}

pub type RouteResult<T> = std::result::Result<T, RouteError>;

// ═══════════════════════════════════════════════════════════════════════════
// FOREIGN-CALL ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════

/// Stable codes for callers on the other side of a foreign-call boundary.
/// Values never change once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    OutOfMemory = 1,
    InvalidParameter = 2,
    InvalidFileDescriptor = 3,
    DeviceNotActive = 4,
    BufferTooSmall = 5,
    PacketTooLarge = 6,
    QueueFull = 7,
    WouldBlock = 8,
    PartialWrite = 9,
    ReadFailed = 10,
    WriteFailed = 11,
    Unknown = 255,
}

impl ErrorCode {
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a read-path error. Generic I/O failures become `ReadFailed`.
    pub fn from_read_error(e: &DeviceError) -> Self {
        match e {
            DeviceError::Io(_) | DeviceError::Timeout => ErrorCode::ReadFailed,
            other => ErrorCode::from(other),
        }
    }

    /// Map a write-path error. Generic I/O failures become `WriteFailed`.
    pub fn from_write_error(e: &DeviceError) -> Self {
        match e {
            DeviceError::Io(_) | DeviceError::Timeout => ErrorCode::WriteFailed,
            other => ErrorCode::from(other),
        }
    }
}

impl From<&DeviceError> for ErrorCode {
    fn from(e: &DeviceError) -> Self {
        match e {
            DeviceError::WouldBlock => ErrorCode::WouldBlock,
            DeviceError::Closed => ErrorCode::DeviceNotActive,
            DeviceError::BufferTooSmall { .. } => ErrorCode::BufferTooSmall,
            DeviceError::PacketTooLarge { .. } => ErrorCode::PacketTooLarge,
            DeviceError::QueueFull => ErrorCode::QueueFull,
            DeviceError::PartialWrite { .. } => ErrorCode::PartialWrite,
            DeviceError::InvalidFileDescriptor(_) => ErrorCode::InvalidFileDescriptor,
            DeviceError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            DeviceError::Io(e) if e.kind() == io::ErrorKind::OutOfMemory => ErrorCode::OutOfMemory,
            DeviceError::Create(_)
            | DeviceError::Timeout
            | DeviceError::ConfigFailed(_)
            | DeviceError::Io(_) => ErrorCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::Success.as_i32(), 0);
        assert_eq!(ErrorCode::WouldBlock.as_i32(), 8);
        assert_eq!(ErrorCode::WriteFailed.as_i32(), 11);
        assert_eq!(ErrorCode::Unknown.as_i32(), 255);
    }

    #[test]
    fn test_would_block_io_maps_to_variant() {
        let e: DeviceError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(matches!(e, DeviceError::WouldBlock));
        assert!(e.is_transient());
        assert!(DeviceError::QueueFull.is_transient());
        assert!(!DeviceError::Closed.is_transient());
    }

    #[test]
    fn test_direction_specific_codes() {
        let e = DeviceError::Io(io::Error::new(io::ErrorKind::Other, "driver"));
        assert_eq!(ErrorCode::from_read_error(&e), ErrorCode::ReadFailed);
        assert_eq!(ErrorCode::from_write_error(&e), ErrorCode::WriteFailed);
        assert_eq!(ErrorCode::from_write_error(&DeviceError::QueueFull), ErrorCode::QueueFull);
        assert_eq!(
            ErrorCode::from(&DeviceError::PacketTooLarge { size: 2000, mtu: 1500 }),
            ErrorCode::PacketTooLarge
        );
    }
}
