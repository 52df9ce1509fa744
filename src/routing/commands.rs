//! Routing tool invocations and output parsers for each platform flavour.
//!
//! All three flavours build on every host so their argv can be checked
//! anywhere; [`native`] is the one the system route table runs.

use std::fmt;
use std::net::Ipv4Addr;

/// A routing tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl RouteCommand {
    fn new(program: &'static str, args: &[&str]) -> Self {
        RouteCommand { program, args: args.iter().map(|a| a.to_string()).collect() }
    }
}

impl fmt::Display for RouteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Which spelling of the default-route install to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandForm {
    Primary,
    Fallback,
}

// ═══════════════════════════════════════════════════════════════════════════
// LINUX (iproute2)
// ═══════════════════════════════════════════════════════════════════════════

pub mod iproute2 {
    use super::*;
    use crate::config::netmask_to_prefix;

    pub fn show_default() -> RouteCommand {
        RouteCommand::new("ip", &["-4", "route", "show", "default"])
    }

    pub fn delete_default() -> RouteCommand {
        RouteCommand::new("ip", &["-4", "route", "del", "default"])
    }

    pub fn add_default(gateway: Ipv4Addr, form: CommandForm) -> RouteCommand {
        let verb = match form {
            CommandForm::Primary => "add",
            CommandForm::Fallback => "replace",
        };
        RouteCommand::new("ip", &["-4", "route", verb, "default", "via", &gateway.to_string()])
    }

    pub fn add_host(dest: Ipv4Addr, gateway: Ipv4Addr) -> RouteCommand {
        RouteCommand::new("ip", &["-4", "route", "add", &format!("{}/32", dest), "via", &gateway.to_string()])
    }

    pub fn delete_host(dest: Ipv4Addr) -> RouteCommand {
        RouteCommand::new("ip", &["-4", "route", "del", &format!("{}/32", dest)])
    }

    /// `netmask` must be contiguous; callers validate before building.
    pub fn add_network(network: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> RouteCommand {
        let cidr = format!("{}/{}", network, netmask_to_prefix(netmask).unwrap_or(32));
        RouteCommand::new("ip", &["-4", "route", "add", &cidr, "via", &gateway.to_string()])
    }

    pub fn delete_network(network: Ipv4Addr, netmask: Ipv4Addr) -> RouteCommand {
        let cidr = format!("{}/{}", network, netmask_to_prefix(netmask).unwrap_or(32));
        RouteCommand::new("ip", &["-4", "route", "del", &cidr])
    }

    pub fn parse_default(output: &str) -> Option<Ipv4Addr> {
        super::parse_ip_route(output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MACOS / BSD (route)
// ═══════════════════════════════════════════════════════════════════════════

pub mod bsd {
    use super::*;

    pub fn show_default() -> RouteCommand {
        RouteCommand::new("route", &["-n", "get", "default"])
    }

    pub fn delete_default() -> RouteCommand {
        RouteCommand::new("route", &["-n", "delete", "default"])
    }

    pub fn add_default(gateway: Ipv4Addr, form: CommandForm) -> RouteCommand {
        let gw = gateway.to_string();
        match form {
            CommandForm::Primary => RouteCommand::new("route", &["-n", "add", "default", &gw]),
            CommandForm::Fallback => {
                RouteCommand::new("route", &["-n", "add", "-net", "0.0.0.0", &gw])
            }
        }
    }

    pub fn add_host(dest: Ipv4Addr, gateway: Ipv4Addr) -> RouteCommand {
        RouteCommand::new("route", &["-n", "add", "-host", &dest.to_string(), &gateway.to_string()])
    }

    pub fn delete_host(dest: Ipv4Addr) -> RouteCommand {
        RouteCommand::new("route", &["-n", "delete", "-host", &dest.to_string()])
    }

    pub fn add_network(network: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> RouteCommand {
        RouteCommand::new(
            "route",
            &["-n", "add", "-net", &network.to_string(), &gateway.to_string(), &netmask.to_string()],
        )
    }

    pub fn delete_network(network: Ipv4Addr, netmask: Ipv4Addr) -> RouteCommand {
        RouteCommand::new(
            "route",
            &["-n", "delete", "-net", &network.to_string(), &netmask.to_string()],
        )
    }

    pub fn parse_default(output: &str) -> Option<Ipv4Addr> {
        super::parse_route_get(output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// WINDOWS (route / netsh)
// ═══════════════════════════════════════════════════════════════════════════

pub mod win {
    use super::*;

    pub fn show_default() -> RouteCommand {
        RouteCommand::new("route", &["print", "0.0.0.0"])
    }

    pub fn delete_default() -> RouteCommand {
        RouteCommand::new("route", &["delete", "0.0.0.0"])
    }

    pub fn add_default(gateway: Ipv4Addr, form: CommandForm) -> RouteCommand {
        match form {
            CommandForm::Primary => RouteCommand::new(
                "route",
                &["add", "0.0.0.0", "mask", "0.0.0.0", &gateway.to_string()],
            ),
            CommandForm::Fallback => RouteCommand::new(
                "netsh",
                &["interface", "ipv4", "add", "route", "0.0.0.0/0", &format!("nexthop={}", gateway)],
            ),
        }
    }

    pub fn add_host(dest: Ipv4Addr, gateway: Ipv4Addr) -> RouteCommand {
        RouteCommand::new(
            "route",
            &["add", &dest.to_string(), "mask", "255.255.255.255", &gateway.to_string()],
        )
    }

    pub fn delete_host(dest: Ipv4Addr) -> RouteCommand {
        RouteCommand::new("route", &["delete", &dest.to_string()])
    }

    pub fn add_network(network: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> RouteCommand {
        RouteCommand::new(
            "route",
            &["add", &network.to_string(), "mask", &netmask.to_string(), &gateway.to_string()],
        )
    }

    pub fn delete_network(network: Ipv4Addr, netmask: Ipv4Addr) -> RouteCommand {
        RouteCommand::new("route", &["delete", &network.to_string(), "mask", &netmask.to_string()])
    }

    pub fn parse_default(output: &str) -> Option<Ipv4Addr> {
        super::parse_route_print(output)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use iproute2 as native;

#[cfg(windows)]
pub use win as native;

#[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
pub use bsd as native;

// ═══════════════════════════════════════════════════════════════════════════
// OUTPUT PARSING
// ═══════════════════════════════════════════════════════════════════════════

/// `default via 192.168.1.1 dev eth0 proto dhcp`
pub fn parse_ip_route(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.find(|&t| t == "via")?;
        tokens.next()?.parse().ok()
    })
}

/// `route -n get default` prints `    gateway: 192.168.1.1` among other fields.
pub fn parse_route_get(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("gateway:")?;
        value.trim().parse().ok()
    })
}

/// Active route row `0.0.0.0  0.0.0.0  <gateway>  <interface>  <metric>`.
pub fn parse_route_print(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["0.0.0.0", "0.0.0.0", gateway, ..] => gateway.parse().ok(),
            _ => None,
        }
    })
}

/// The tool reported that the route it was asked about does not exist.
pub fn is_missing_route(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("not in table") || stderr.contains("no such process") || stderr.contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(cmd: &RouteCommand) -> String {
        cmd.to_string()
    }

    const GW: Ipv4Addr = Ipv4Addr::new(10, 8, 0, 1);
    const DEST: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);
    const NET: Ipv4Addr = Ipv4Addr::new(10, 20, 0, 0);
    const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 0, 0);

    #[test]
    fn test_iproute2_argv() {
        assert_eq!(argv(&iproute2::show_default()), "ip -4 route show default");
        assert_eq!(argv(&iproute2::delete_default()), "ip -4 route del default");
        assert_eq!(
            argv(&iproute2::add_default(GW, CommandForm::Primary)),
            "ip -4 route add default via 10.8.0.1"
        );
        assert_eq!(
            argv(&iproute2::add_default(GW, CommandForm::Fallback)),
            "ip -4 route replace default via 10.8.0.1"
        );
        assert_eq!(argv(&iproute2::add_host(DEST, GW)), "ip -4 route add 203.0.113.7/32 via 10.8.0.1");
        assert_eq!(argv(&iproute2::delete_host(DEST)), "ip -4 route del 203.0.113.7/32");
        assert_eq!(argv(&iproute2::add_network(NET, MASK, GW)), "ip -4 route add 10.20.0.0/16 via 10.8.0.1");
        assert_eq!(argv(&iproute2::delete_network(NET, MASK)), "ip -4 route del 10.20.0.0/16");
    }

    #[test]
    fn test_bsd_argv() {
        assert_eq!(argv(&bsd::show_default()), "route -n get default");
        assert_eq!(argv(&bsd::delete_default()), "route -n delete default");
        assert_eq!(argv(&bsd::add_default(GW, CommandForm::Primary)), "route -n add default 10.8.0.1");
        assert_eq!(
            argv(&bsd::add_default(GW, CommandForm::Fallback)),
            "route -n add -net 0.0.0.0 10.8.0.1"
        );
        assert_eq!(argv(&bsd::add_host(DEST, GW)), "route -n add -host 203.0.113.7 10.8.0.1");
        assert_eq!(argv(&bsd::delete_host(DEST)), "route -n delete -host 203.0.113.7");
        assert_eq!(
            argv(&bsd::add_network(NET, MASK, GW)),
            "route -n add -net 10.20.0.0 10.8.0.1 255.255.0.0"
        );
        assert_eq!(argv(&bsd::delete_network(NET, MASK)), "route -n delete -net 10.20.0.0 255.255.0.0");
    }

    #[test]
    fn test_windows_argv() {
        assert_eq!(argv(&win::show_default()), "route print 0.0.0.0");
        assert_eq!(argv(&win::delete_default()), "route delete 0.0.0.0");
        assert_eq!(
            argv(&win::add_default(GW, CommandForm::Primary)),
            "route add 0.0.0.0 mask 0.0.0.0 10.8.0.1"
        );
        assert_eq!(
            argv(&win::add_default(GW, CommandForm::Fallback)),
            "netsh interface ipv4 add route 0.0.0.0/0 nexthop=10.8.0.1"
        );
        assert_eq!(argv(&win::add_host(DEST, GW)), "route add 203.0.113.7 mask 255.255.255.255 10.8.0.1");
        assert_eq!(argv(&win::delete_host(DEST)), "route delete 203.0.113.7");
        assert_eq!(argv(&win::add_network(NET, MASK, GW)), "route add 10.20.0.0 mask 255.255.0.0 10.8.0.1");
        assert_eq!(argv(&win::delete_network(NET, MASK)), "route delete 10.20.0.0 mask 255.255.0.0");
    }

    #[test]
    fn test_parse_ip_route() {
        let out = "default via 192.168.1.1 dev eth0 proto dhcp metric 100\n";
        assert_eq!(parse_ip_route(out), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(parse_ip_route("default dev wg0 scope link\n"), None);
        assert_eq!(parse_ip_route(""), None);
    }

    #[test]
    fn test_parse_route_get() {
        let out = "   route to: default\ndestination: default\n       mask: default\n    gateway: 192.168.0.254\n  interface: en0\n";
        assert_eq!(parse_route_get(out), Some(Ipv4Addr::new(192, 168, 0, 254)));
        assert_eq!(parse_route_get("route: writing to routing socket: not in table\n"), None);
    }

    #[test]
    fn test_parse_route_print() {
        let out = "\
IPv4 Route Table
===========================================================================
Active Routes:
Network Destination        Netmask          Gateway       Interface  Metric
          0.0.0.0          0.0.0.0      192.168.1.1    192.168.1.100     25
===========================================================================
";
        assert_eq!(parse_route_print(out), Some(Ipv4Addr::new(192, 168, 1, 1)));

        let on_link = "          0.0.0.0          0.0.0.0         On-link     10.8.0.2     5\n";
        assert_eq!(parse_route_print(on_link), None);
    }

    #[test]
    fn test_missing_route_detection() {
        assert!(is_missing_route("route: writing to routing socket: not in table"));
        assert!(is_missing_route("RTNETLINK answers: No such process"));
        assert!(!is_missing_route("RTNETLINK answers: Operation not permitted"));
    }
}
