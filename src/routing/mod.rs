//! # Routing Module
//!
//! Temporarily points the system default route at the VPN and puts the
//! previous routing state back afterwards.
//!
//! ```text
//! Uninitialized ──capture──▶ GatewaySaved ──replace──▶ VpnActive
//!        │                        │                        │
//!        └────────replace─────────┴────────restore─────────┴──▶ Restored
//! ```
//!
//! Deleting the old default and adding the new one are separate commands,
//! so a failure between the two leaves the host briefly without a default
//! route. Restore is idempotent and also runs on drop.

pub mod commands;
pub mod system;

pub use crate::config::{netmask_to_prefix, prefix_to_netmask};
pub use commands::{CommandForm, RouteCommand};
pub use system::SystemRouteTable;

use crate::constants::DEFAULT_ROUTE_DELETE_ATTEMPTS;
use crate::error::{RouteError, RouteResult};
use std::net::Ipv4Addr;

/// Operations on the host IPv4 routing table
pub trait RouteTable {
    /// Current default gateway, `None` if there is no default route.
    fn default_gateway(&mut self) -> RouteResult<Option<Ipv4Addr>>;

    fn delete_default(&mut self) -> RouteResult<()>;

    fn add_default(&mut self, gateway: Ipv4Addr, form: CommandForm) -> RouteResult<()>;

    fn add_host(&mut self, dest: Ipv4Addr, gateway: Ipv4Addr) -> RouteResult<()>;

    fn delete_host(&mut self, dest: Ipv4Addr) -> RouteResult<()>;

    fn add_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> RouteResult<()>;

    fn delete_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr) -> RouteResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePhase {
    Uninitialized,
    GatewaySaved,
    VpnActive,
    Restored,
}

/// A route added through the manager and removed again on restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedRoute {
    Host(Ipv4Addr),
    Network { network: Ipv4Addr, netmask: Ipv4Addr },
}

impl std::fmt::Display for TrackedRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackedRoute::Host(dest) => write!(f, "{}/32", dest),
            TrackedRoute::Network { network, netmask } => match netmask_to_prefix(*netmask) {
                Some(prefix) => write!(f, "{}/{}", network, prefix),
                None => write!(f, "{} mask {}", network, netmask),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteState {
    pub original_gateway: Option<Ipv4Addr>,
    pub vpn_gateway: Option<Ipv4Addr>,
    pub tracked: Vec<TrackedRoute>,
    /// A VPN default route is currently installed
    pub configured: bool,
}

/// Route lifecycle manager. Dropping it restores the original routes.
pub struct RouteManager<T: RouteTable = SystemRouteTable> {
    table: T,
    state: RouteState,
    phase: RoutePhase,
    captured: bool,
}

impl RouteManager<SystemRouteTable> {
    /// Manager over the host routing table.
    pub fn system() -> Self {
        Self::new(SystemRouteTable::new())
    }
}

impl<T: RouteTable> RouteManager<T> {
    pub fn new(table: T) -> Self {
        RouteManager {
            table,
            state: RouteState::default(),
            phase: RoutePhase::Uninitialized,
            captured: false,
        }
    }

    #[inline]
    pub fn phase(&self) -> RoutePhase {
        self.phase
    }

    #[inline]
    pub fn state(&self) -> &RouteState {
        &self.state
    }

    #[inline]
    pub fn original_gateway(&self) -> Option<Ipv4Addr> {
        self.state.original_gateway
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.state.configured
    }

    #[inline]
    pub fn table(&self) -> &T {
        &self.table
    }

    #[inline]
    pub fn table_mut(&mut self) -> &mut T {
        &mut self.table
    }

    /// Remember the current default gateway.
    ///
    /// Having no default route is not an error; the phase then stays
    /// `Uninitialized` and a later call may try again. Once a gateway has
    /// been saved, or the default route has been replaced, further calls
    /// return the saved value without querying: the table then holds the
    /// VPN's own default route.
    pub fn capture_default_gateway(&mut self) -> RouteResult<Option<Ipv4Addr>> {
        if self.captured || matches!(self.phase, RoutePhase::VpnActive | RoutePhase::Restored) {
            return Ok(self.state.original_gateway);
        }

        match self.table.default_gateway()? {
            Some(gateway) => {
                log::info!("Saved default gateway: {}", gateway);
                self.state.original_gateway = Some(gateway);
                self.captured = true;
                if self.phase == RoutePhase::Uninitialized {
                    self.phase = RoutePhase::GatewaySaved;
                }
                Ok(Some(gateway))
            }
            None => {
                log::info!("No default route present, nothing to save");
                Ok(None)
            }
        }
    }

    /// Point the default route at `vpn_gateway`.
    pub fn replace_default_gateway(&mut self, vpn_gateway: Ipv4Addr) -> RouteResult<()> {
        log::info!("Replacing default route via {}", vpn_gateway);

        for attempt in 1..=DEFAULT_ROUTE_DELETE_ATTEMPTS {
            if let Err(e) = self.table.delete_default() {
                log::debug!("Delete default route (attempt {}): {}", attempt, e);
            }
        }

        self.install_default(vpn_gateway)?;

        self.state.vpn_gateway = Some(vpn_gateway);
        self.state.configured = true;
        self.phase = RoutePhase::VpnActive;
        log::info!("✓ Default route via {}", vpn_gateway);
        Ok(())
    }

    fn install_default(&mut self, gateway: Ipv4Addr) -> RouteResult<()> {
        let primary = match self.table.add_default(gateway, CommandForm::Primary) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        log::warn!("Default route via {} failed ({}), trying fallback form", gateway, primary);

        self.table
            .add_default(gateway, CommandForm::Fallback)
            .map_err(|fallback| {
                RouteError::InstallFailed(format!(
                    "default via {}: {}; fallback: {}",
                    gateway, primary, fallback
                ))
            })
    }

    pub fn add_host_route(&mut self, dest: Ipv4Addr, gateway: Ipv4Addr) -> RouteResult<()> {
        self.table.add_host(dest, gateway)?;
        log::info!("Added host route {} via {}", dest, gateway);
        self.track(TrackedRoute::Host(dest));
        Ok(())
    }

    pub fn add_network_route(
        &mut self,
        network: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> RouteResult<()> {
        if netmask_to_prefix(netmask).is_none() {
            return Err(RouteError::InvalidNetmask(netmask));
        }
        self.table.add_network(network, netmask, gateway)?;
        let route = TrackedRoute::Network { network, netmask };
        log::info!("Added network route {} via {}", route, gateway);
        self.track(route);
        Ok(())
    }

    pub fn delete_host_route(&mut self, dest: Ipv4Addr) -> RouteResult<()> {
        self.table.delete_host(dest)?;
        self.untrack(TrackedRoute::Host(dest));
        log::info!("Deleted host route {}", dest);
        Ok(())
    }

    pub fn delete_network_route(&mut self, network: Ipv4Addr, netmask: Ipv4Addr) -> RouteResult<()> {
        self.table.delete_network(network, netmask)?;
        let route = TrackedRoute::Network { network, netmask };
        self.untrack(route);
        log::info!("Deleted network route {}", route);
        Ok(())
    }

    fn track(&mut self, route: TrackedRoute) {
        if !self.state.tracked.contains(&route) {
            self.state.tracked.push(route);
        }
    }

    fn untrack(&mut self, route: TrackedRoute) {
        self.state.tracked.retain(|r| *r != route);
    }

    /// Undo `replace_default_gateway` and remove tracked routes.
    ///
    /// Does nothing unless a VPN default route is installed. Deletions are
    /// best effort; failing to put the original gateway back is reported
    /// after the tracked routes have been cleaned up.
    pub fn restore(&mut self) -> RouteResult<()> {
        if !self.state.configured {
            if self.phase == RoutePhase::GatewaySaved {
                self.phase = RoutePhase::Restored;
            }
            return Ok(());
        }
        log::info!("Restoring routes");

        if let Err(e) = self.table.delete_default() {
            log::warn!("Delete VPN default route: {}", e);
        }

        let reinstall = match self.state.original_gateway {
            Some(gateway) => self.install_default(gateway).map(|()| {
                log::info!("✓ Default route via {} restored", gateway);
            }),
            None => {
                log::info!("No original gateway was saved, leaving default route unset");
                Ok(())
            }
        };

        for route in std::mem::take(&mut self.state.tracked) {
            let result = match route {
                TrackedRoute::Host(dest) => self.table.delete_host(dest),
                TrackedRoute::Network { network, netmask } => {
                    self.table.delete_network(network, netmask)
                }
            };
            match result {
                Ok(()) => log::debug!("Removed route {}", route),
                Err(e) => log::warn!("Remove route {}: {}", route, e),
            }
        }

        self.state.configured = false;
        self.state.vpn_gateway = None;
        self.phase = RoutePhase::Restored;
        reinstall
    }
}

impl<T: RouteTable> Drop for RouteManager<T> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            log::error!("Route restore on teardown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Table {
        default: Option<Ipv4Addr>,
        hosts: BTreeSet<Ipv4Addr>,
        networks: BTreeSet<(Ipv4Addr, Ipv4Addr)>,
        log: Vec<String>,
        fail_primary: bool,
        fail_fallback: bool,
        fail_host_delete: bool,
    }

    /// Shares the table with the test so it can be inspected after drop.
    #[derive(Clone, Default)]
    struct Memory(Rc<RefCell<Table>>);

    fn failed(what: &str) -> RouteError {
        RouteError::Command { command: what.into(), stderr: "refused".into() }
    }

    impl RouteTable for Memory {
        fn default_gateway(&mut self) -> RouteResult<Option<Ipv4Addr>> {
            Ok(self.0.borrow().default)
        }

        fn delete_default(&mut self) -> RouteResult<()> {
            let mut t = self.0.borrow_mut();
            t.log.push("del default".into());
            t.default.take().map(|_| ()).ok_or_else(|| failed("del default"))
        }

        fn add_default(&mut self, gateway: Ipv4Addr, form: CommandForm) -> RouteResult<()> {
            let mut t = self.0.borrow_mut();
            t.log.push(format!("add default {} {:?}", gateway, form));
            let refuse = match form {
                CommandForm::Primary => t.fail_primary,
                CommandForm::Fallback => t.fail_fallback,
            };
            if refuse {
                return Err(failed("add default"));
            }
            t.default = Some(gateway);
            Ok(())
        }

        fn add_host(&mut self, dest: Ipv4Addr, _gateway: Ipv4Addr) -> RouteResult<()> {
            let mut t = self.0.borrow_mut();
            t.log.push(format!("add host {}", dest));
            t.hosts.insert(dest);
            Ok(())
        }

        fn delete_host(&mut self, dest: Ipv4Addr) -> RouteResult<()> {
            let mut t = self.0.borrow_mut();
            t.log.push(format!("del host {}", dest));
            if t.fail_host_delete || !t.hosts.remove(&dest) {
                return Err(failed("del host"));
            }
            Ok(())
        }

        fn add_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr, _gateway: Ipv4Addr) -> RouteResult<()> {
            let mut t = self.0.borrow_mut();
            t.log.push(format!("add net {}", network));
            t.networks.insert((network, netmask));
            Ok(())
        }

        fn delete_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr) -> RouteResult<()> {
            let mut t = self.0.borrow_mut();
            t.log.push(format!("del net {}", network));
            t.networks
                .remove(&(network, netmask))
                .then_some(())
                .ok_or_else(|| failed("del net"))
        }
    }

    const HOME: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const VPN: Ipv4Addr = Ipv4Addr::new(10, 8, 0, 1);
    const PEER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);
    const NET: Ipv4Addr = Ipv4Addr::new(10, 20, 0, 0);
    const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 0, 0);

    fn manager_with_default(gateway: Option<Ipv4Addr>) -> (RouteManager<Memory>, Memory) {
        let memory = Memory::default();
        memory.0.borrow_mut().default = gateway;
        (RouteManager::new(memory.clone()), memory)
    }

    #[test]
    fn test_round_trip_restores_gateway() {
        let (mut manager, memory) = manager_with_default(Some(HOME));

        assert_eq!(manager.capture_default_gateway().unwrap(), Some(HOME));
        assert_eq!(manager.phase(), RoutePhase::GatewaySaved);

        manager.replace_default_gateway(VPN).unwrap();
        assert_eq!(manager.phase(), RoutePhase::VpnActive);
        assert_eq!(memory.0.borrow().default, Some(VPN));

        manager.restore().unwrap();
        assert_eq!(manager.phase(), RoutePhase::Restored);
        assert_eq!(manager.table_mut().default_gateway().unwrap(), Some(HOME));
    }

    #[test]
    fn test_capture_after_replace_keeps_prior_state() {
        let (mut manager, memory) = manager_with_default(None);

        assert_eq!(manager.capture_default_gateway().unwrap(), None);
        assert_eq!(manager.phase(), RoutePhase::Uninitialized);

        manager.replace_default_gateway(VPN).unwrap();
        assert_eq!(manager.capture_default_gateway().unwrap(), None);
        assert_eq!(manager.original_gateway(), None);

        manager.restore().unwrap();
        assert_eq!(memory.0.borrow().default, None);
        assert_eq!(manager.capture_default_gateway().unwrap(), None);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        manager.capture_default_gateway().unwrap();
        manager.replace_default_gateway(VPN).unwrap();

        manager.restore().unwrap();
        let mutations = memory.0.borrow().log.len();
        manager.restore().unwrap();
        drop(manager);
        assert_eq!(memory.0.borrow().log.len(), mutations);
    }

    #[test]
    fn test_restore_without_replace_touches_nothing() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        manager.capture_default_gateway().unwrap();
        manager.restore().unwrap();
        assert_eq!(manager.phase(), RoutePhase::Restored);
        assert!(memory.0.borrow().log.is_empty());
    }

    #[test]
    fn test_capture_happens_once() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        manager.capture_default_gateway().unwrap();
        memory.0.borrow_mut().default = Some(VPN);
        assert_eq!(manager.capture_default_gateway().unwrap(), Some(HOME));
    }

    #[test]
    fn test_absent_gateway_is_not_an_error() {
        let (mut manager, memory) = manager_with_default(None);
        assert_eq!(manager.capture_default_gateway().unwrap(), None);
        assert_eq!(manager.phase(), RoutePhase::Uninitialized);

        manager.replace_default_gateway(VPN).unwrap();
        manager.restore().unwrap();
        assert_eq!(memory.0.borrow().default, None);
    }

    #[test]
    fn test_fallback_form_used() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        memory.0.borrow_mut().fail_primary = true;
        manager.replace_default_gateway(VPN).unwrap();

        let t = memory.0.borrow();
        assert_eq!(t.default, Some(VPN));
        assert!(t.log.iter().any(|l| l.ends_with("Fallback")));
    }

    #[test]
    fn test_both_forms_failing_is_fatal() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        {
            let mut t = memory.0.borrow_mut();
            t.fail_primary = true;
            t.fail_fallback = true;
        }
        assert!(matches!(
            manager.replace_default_gateway(VPN),
            Err(RouteError::InstallFailed(_))
        ));
        assert!(!manager.is_configured());
        assert_eq!(manager.phase(), RoutePhase::Uninitialized);
    }

    #[test]
    fn test_tracked_routes_removed_best_effort() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        manager.capture_default_gateway().unwrap();
        manager.replace_default_gateway(VPN).unwrap();
        manager.add_host_route(PEER, HOME).unwrap();
        manager.add_network_route(NET, MASK, VPN).unwrap();
        assert_eq!(manager.state().tracked.len(), 2);

        memory.0.borrow_mut().fail_host_delete = true;
        manager.restore().unwrap();

        let t = memory.0.borrow();
        assert!(t.networks.is_empty());
        assert!(t.hosts.contains(&PEER));
        assert_eq!(t.default, Some(HOME));
        assert!(manager.state().tracked.is_empty());
    }

    #[test]
    fn test_explicit_delete_untracks() {
        let (mut manager, _memory) = manager_with_default(Some(HOME));
        manager.add_host_route(PEER, HOME).unwrap();
        manager.delete_host_route(PEER).unwrap();
        assert!(manager.state().tracked.is_empty());
        assert!(manager.delete_host_route(PEER).is_err());
    }

    #[test]
    fn test_non_contiguous_mask_rejected() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        let holey = Ipv4Addr::new(255, 0, 255, 0);
        assert!(matches!(
            manager.add_network_route(NET, holey, VPN),
            Err(RouteError::InvalidNetmask(_))
        ));
        assert!(memory.0.borrow().log.is_empty());
    }

    #[test]
    fn test_drop_restores() {
        let (mut manager, memory) = manager_with_default(Some(HOME));
        manager.capture_default_gateway().unwrap();
        manager.replace_default_gateway(VPN).unwrap();
        drop(manager);
        assert_eq!(memory.0.borrow().default, Some(HOME));
    }

    #[test]
    fn test_tracked_route_display() {
        assert_eq!(TrackedRoute::Host(PEER).to_string(), "203.0.113.7/32");
        assert_eq!(
            TrackedRoute::Network { network: NET, netmask: MASK }.to_string(),
            "10.20.0.0/16"
        );
    }
}
