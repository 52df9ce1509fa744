//! Route manager lifecycle against an in-memory routing table, driven from
//! a parsed configuration the way the CLI drives it.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use tunbridge::routing::CommandForm;
use tunbridge::{Config, RouteError, RouteManager, RoutePhase, RouteResult, RouteTable};

#[derive(Debug, Default)]
struct Routes {
    default: Option<Ipv4Addr>,
    entries: Vec<(Ipv4Addr, Ipv4Addr, Ipv4Addr)>,
    mutations: usize,
}

#[derive(Clone, Default)]
struct SharedTable(Rc<RefCell<Routes>>);

impl SharedTable {
    fn with_default(gateway: Ipv4Addr) -> Self {
        let table = SharedTable::default();
        table.0.borrow_mut().default = Some(gateway);
        table
    }

    fn gateway(&self) -> Option<Ipv4Addr> {
        self.0.borrow().default
    }

    fn via(&self, mask: Ipv4Addr) -> Vec<Ipv4Addr> {
        let routes = self.0.borrow();
        routes.entries.iter().filter(|e| e.1 == mask).map(|e| e.2).collect()
    }

    fn entries(&self) -> usize {
        self.0.borrow().entries.len()
    }

    fn mutations(&self) -> usize {
        self.0.borrow().mutations
    }

    fn remove(&mut self, dest: Ipv4Addr, mask: Ipv4Addr) -> RouteResult<()> {
        let mut routes = self.0.borrow_mut();
        routes.mutations += 1;
        let before = routes.entries.len();
        routes.entries.retain(|&(d, m, _)| !(d == dest && m == mask));
        if routes.entries.len() == before {
            return Err(RouteError::Command {
                command: format!("delete {}", dest),
                stderr: "not in table".into(),
            });
        }
        Ok(())
    }
}

const HOST_MASK: Ipv4Addr = Ipv4Addr::BROADCAST;

impl RouteTable for SharedTable {
    fn default_gateway(&mut self) -> RouteResult<Option<Ipv4Addr>> {
        Ok(self.gateway())
    }

    fn delete_default(&mut self) -> RouteResult<()> {
        let mut routes = self.0.borrow_mut();
        routes.mutations += 1;
        routes.default = None;
        Ok(())
    }

    fn add_default(&mut self, gateway: Ipv4Addr, _form: CommandForm) -> RouteResult<()> {
        let mut routes = self.0.borrow_mut();
        routes.mutations += 1;
        routes.default = Some(gateway);
        Ok(())
    }

    fn add_host(&mut self, dest: Ipv4Addr, gateway: Ipv4Addr) -> RouteResult<()> {
        let mut routes = self.0.borrow_mut();
        routes.mutations += 1;
        routes.entries.push((dest, HOST_MASK, gateway));
        Ok(())
    }

    fn delete_host(&mut self, dest: Ipv4Addr) -> RouteResult<()> {
        self.remove(dest, HOST_MASK)
    }

    fn add_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> RouteResult<()> {
        let mut routes = self.0.borrow_mut();
        routes.mutations += 1;
        routes.entries.push((network, netmask, gateway));
        Ok(())
    }

    fn delete_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr) -> RouteResult<()> {
        self.remove(network, netmask)
    }
}

const CONFIG: &str = r#"
[device]
mtu = 1400

[routes]
vpn_gateway = "10.8.0.1"
hosts = ["203.0.113.7", "198.51.100.20"]
networks = [{ network = "10.20.0.0", netmask = "255.255.0.0" }]
"#;

#[test]
fn full_lifecycle_from_config() {
    let config = Config::from_str(CONFIG).unwrap();
    let vpn = config.routes.vpn_gateway().unwrap().unwrap();
    let home = Ipv4Addr::new(192, 168, 1, 1);

    let table = SharedTable::with_default(home);
    let mut manager = RouteManager::new(table.clone());

    let before = manager.capture_default_gateway().unwrap();
    manager.replace_default_gateway(vpn).unwrap();
    let via = manager.original_gateway().unwrap_or(vpn);
    for host in config.routes.hosts().unwrap() {
        manager.add_host_route(host, via).unwrap();
    }
    for (network, netmask) in config.routes.networks().unwrap() {
        manager.add_network_route(network, netmask, vpn).unwrap();
    }
    assert_eq!(table.gateway(), Some(vpn));
    assert_eq!(table.entries(), 3);
    assert_eq!(table.via(HOST_MASK), vec![home, home]);

    manager.restore().unwrap();
    assert_eq!(manager.table_mut().default_gateway().unwrap(), before);
    assert_eq!(table.entries(), 0);
    assert_eq!(manager.phase(), RoutePhase::Restored);
}

#[test]
fn capture_after_replace_does_not_save_vpn_gateway() {
    let table = SharedTable::default();
    let mut manager = RouteManager::new(table.clone());
    assert_eq!(manager.capture_default_gateway().unwrap(), None);

    manager.replace_default_gateway(Ipv4Addr::new(10, 8, 0, 1)).unwrap();
    assert_eq!(manager.capture_default_gateway().unwrap(), None);

    manager.restore().unwrap();
    assert_eq!(table.gateway(), None);
}

#[test]
fn second_restore_and_drop_do_not_mutate() {
    let table = SharedTable::with_default(Ipv4Addr::new(192, 168, 1, 1));
    let mut manager = RouteManager::new(table.clone());
    manager.capture_default_gateway().unwrap();
    manager.replace_default_gateway(Ipv4Addr::new(10, 8, 0, 1)).unwrap();

    manager.restore().unwrap();
    let after_first = table.mutations();
    manager.restore().unwrap();
    drop(manager);
    assert_eq!(table.mutations(), after_first);
}

#[test]
fn externally_removed_route_does_not_block_cleanup() {
    let table = SharedTable::with_default(Ipv4Addr::new(192, 168, 1, 1));
    let mut manager = RouteManager::new(table.clone());
    let vpn = Ipv4Addr::new(10, 8, 0, 1);
    manager.capture_default_gateway().unwrap();
    manager.replace_default_gateway(vpn).unwrap();
    manager.add_host_route(Ipv4Addr::new(203, 0, 113, 7), vpn).unwrap();
    manager
        .add_network_route(Ipv4Addr::new(10, 20, 0, 0), Ipv4Addr::new(255, 255, 0, 0), vpn)
        .unwrap();

    table.0.borrow_mut().entries.remove(0);

    manager.restore().unwrap();
    assert_eq!(table.entries(), 0);
    assert_eq!(table.gateway(), Some(Ipv4Addr::new(192, 168, 1, 1)));
}

#[test]
fn teardown_restores_without_explicit_call() {
    let home = Ipv4Addr::new(172, 16, 0, 1);
    let table = SharedTable::with_default(home);
    {
        let mut manager = RouteManager::new(table.clone());
        manager.capture_default_gateway().unwrap();
        manager.replace_default_gateway(Ipv4Addr::new(10, 8, 0, 1)).unwrap();
    }
    assert_eq!(table.gateway(), Some(home));
}
