//! # Configuration Module
//!
//! TOML configuration for the device and the routes installed around it.

use crate::constants::{DEFAULT_MTU, DEFAULT_QUEUE_CAPACITY};
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════
// DEVICE
// ═══════════════════════════════════════════════════════════════════════════

/// Framing of packets exchanged with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Raw IP packets (TUN)
    #[default]
    Network,
    /// Ethernet frames (TAP)
    Link,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Network => write!(f, "tun"),
            Mode::Link => write!(f, "tap"),
        }
    }
}

/// Options accepted by every backend's `open`. Fields a backend has no use
/// for are ignored by it.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Requested interface name; the OS may override it
    #[serde(default)]
    pub name: Option<String>,
    /// Device number hint, auto-assigned when absent
    #[serde(default)]
    pub unit: Option<u32>,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    #[serde(default = "default_true")]
    pub non_blocking: bool,
    #[serde(default)]
    pub mode: Mode,
    /// Linux: keep the interface after the descriptor closes
    #[serde(default)]
    pub persist: bool,
    /// Linux: owning uid of a persistent interface
    #[serde(default)]
    pub owner: Option<u32>,
    /// Linux: owning gid of a persistent interface
    #[serde(default)]
    pub group: Option<u32>,
    /// Queue backend: capacity of each direction
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Managed-session backend: descriptor handed over by the OS
    #[serde(skip)]
    pub fd: Option<i32>,
}

fn default_mtu() -> usize { DEFAULT_MTU }
fn default_true() -> bool { true }
fn default_queue_capacity() -> usize { DEFAULT_QUEUE_CAPACITY }

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: None,
            unit: None,
            mtu: DEFAULT_MTU,
            non_blocking: true,
            mode: Mode::Network,
            persist: false,
            owner: None,
            group: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            fd: None,
        }
    }
}

impl DeviceConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_unit(mut self, unit: u32) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_non_blocking(mut self, non_blocking: bool) -> Self {
        self.non_blocking = non_blocking;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_fd(mut self, fd: i32) -> Self {
        self.fd = Some(fd);
        self
    }

    /// Interface name to request: explicit name, else `<mode><unit>`, else
    /// a pattern the kernel fills in.
    pub fn requested_name(&self) -> String {
        match (&self.name, self.unit) {
            (Some(name), _) => name.clone(),
            (None, Some(unit)) => format!("{}{}", self.mode, unit),
            (None, None) => format!("{}%d", self.mode),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NetworkRoute {
    pub network: String,
    pub netmask: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoutesSection {
    /// Gateway on the VPN side that becomes the default route
    #[serde(default)]
    pub vpn_gateway: Option<String>,
    /// Host routes through the VPN gateway
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub networks: Vec<NetworkRoute>,
}

impl RoutesSection {
    pub fn vpn_gateway(&self) -> Result<Option<Ipv4Addr>, ConfigError> {
        self.vpn_gateway.as_deref().map(parse_addr).transpose()
    }

    pub fn hosts(&self) -> Result<Vec<Ipv4Addr>, ConfigError> {
        self.hosts.iter().map(|h| parse_addr(h)).collect()
    }

    pub fn networks(&self) -> Result<Vec<(Ipv4Addr, Ipv4Addr)>, ConfigError> {
        self.networks
            .iter()
            .map(|n| {
                let mask = parse_addr(&n.netmask)?;
                if netmask_to_prefix(mask).is_none() {
                    return Err(ConfigError::InvalidAddress(n.netmask.clone()));
                }
                Ok((parse_addr(&n.network)?, mask))
            })
            .collect()
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "warn".to_string() }

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection { level: default_log_level() }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub routes: RoutesSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.device.mtu == 0 || self.device.mtu > u16::MAX as usize {
            return Err(ConfigError::ParseError(format!("mtu out of range: {}", self.device.mtu)));
        }
        if self.device.queue_capacity == 0 {
            return Err(ConfigError::ParseError("queue_capacity must be positive".into()));
        }
        self.routes.vpn_gateway()?;
        self.routes.hosts()?;
        self.routes.networks()?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    InvalidAddress(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::InvalidAddress(a) => write!(f, "Invalid address: {}", a),
        }
    }
}

impl std::error::Error for ConfigError {}

// ═══════════════════════════════════════════════════════════════════════════
// UTILITIES
// ═══════════════════════════════════════════════════════════════════════════

fn parse_addr(s: &str) -> Result<Ipv4Addr, ConfigError> {
    s.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(s.to_string()))
}

pub fn prefix_to_netmask(prefix: u8) -> Ipv4Addr {
    let mask = if prefix >= 32 {
        0xFFFFFFFFu32
    } else if prefix == 0 {
        0
    } else {
        !((1u32 << (32 - prefix)) - 1)
    };
    Ipv4Addr::from(mask)
}

/// Prefix length of a contiguous netmask; `None` for masks with holes.
pub fn netmask_to_prefix(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    if bits.checked_shl(prefix).unwrap_or(0) != 0 {
        return None;
    }
    Some(prefix as u8)
}

pub fn example_config() -> &'static str {
    r#"# tunbridge configuration

[device]
# name = "tun0"         # requested name; the OS may assign another
# unit = 0              # device number hint (utun/tap index)
mtu = 1500
non_blocking = true
mode = "network"        # "network" (TUN) or "link" (TAP)

[routes]
vpn_gateway = "10.8.0.1"
hosts = []
# networks = [{ network = "10.20.0.0", netmask = "255.255.0.0" }]

[logging]
level = "warn"
"#
}
