//! # CLI Commands
//!
//! Command implementations for the tunbridge CLI.

use super::output::{print_active, print_field, print_success, print_warning};
use super::{setup_logging, CliError, CliResult};
use crate::config::{example_config, Config};
use crate::error::DeviceError;
use crate::packet::IpVersion;
use crate::routing::RouteManager;
use crate::tun::TunDevice;
use std::io::{self, BufRead};
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn load_config(path: &str, verbose: bool) -> CliResult<Config> {
    let config = Config::from_file(path)?;
    setup_logging(verbose, Some(&config.logging.level));
    log::debug!("Loaded configuration from {}", path);
    Ok(config)
}

/// Print the current default gateway
pub fn cmd_gateway(verbose: bool) -> CliResult<()> {
    setup_logging(verbose, None);
    let mut manager = RouteManager::system();
    match manager.capture_default_gateway()? {
        Some(gateway) => print_field("gateway", gateway),
        None => print_warning("No default route"),
    }
    Ok(())
}

/// Open the configured device and read a few packets from it
pub fn cmd_probe(config_path: &str, count: usize, verbose: bool) -> CliResult<()> {
    let config = load_config(config_path, verbose)?;

    let mut device = TunDevice::create(&config.device)?;
    print_success(&format!("Opened {}", device.name()));
    print_field("mode", device.mode());
    print_field("mtu", device.mtu());
    device.up()?;

    let mut buf = vec![0u8; device.mtu() + 64];
    let mut seen = 0;
    while seen < count {
        match device.read(&mut buf) {
            Ok(n) => {
                seen += 1;
                let version = match IpVersion::from_packet(&buf[..n]) {
                    IpVersion::V4 => "IPv4",
                    IpVersion::V6 => "IPv6",
                    IpVersion::Unknown => "other",
                };
                print_active(&format!("#{:<4} {:>5} bytes  {}", seen, n, version));
            }
            Err(DeviceError::WouldBlock) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(e.into()),
        }
    }

    device.close();
    print_success(&format!("Read {} packet(s)", seen));
    Ok(())
}

/// Route traffic through the VPN gateway until Enter is pressed
pub fn cmd_route(config_path: &str, verbose: bool) -> CliResult<()> {
    let config = load_config(config_path, verbose)?;
    let vpn_gateway = config
        .routes
        .vpn_gateway()?
        .ok_or_else(|| CliError::Usage("routes.vpn_gateway is not set".into()))?;

    let mut device = TunDevice::create(&config.device)?;
    device.up()?;
    print_success(&format!("Opened {}", device.name()));

    let mut manager = RouteManager::system();
    if let Some(original) = manager.capture_default_gateway()? {
        print_field("saved", original);
    }
    manager.replace_default_gateway(vpn_gateway)?;
    print_success(&format!("Default route via {}", vpn_gateway));

    let via = bypass_gateway(manager.original_gateway(), vpn_gateway);
    for host in config.routes.hosts()? {
        manager.add_host_route(host, via)?;
        print_field("host", format!("{} via {}", host, via));
    }
    for (network, netmask) in config.routes.networks()? {
        manager.add_network_route(network, netmask, vpn_gateway)?;
        print_field("network", format!("{} {}", network, netmask));
    }

    print_active("Routes active, press Enter to restore");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    manager.restore()?;
    device.close();
    print_success("Routes restored");
    Ok(())
}

/// Host routes bypass the tunnel through the saved gateway.
fn bypass_gateway(original: Option<Ipv4Addr>, vpn_gateway: Ipv4Addr) -> Ipv4Addr {
    match original {
        Some(gateway) => gateway,
        None => {
            print_warning(&format!("No saved gateway, host routes go via {}", vpn_gateway));
            vpn_gateway
        }
    }
}

/// Print a configuration template
pub fn cmd_init() -> CliResult<()> {
    print!("{}", example_config());
    Ok(())
}
