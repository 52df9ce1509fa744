//! Route table backed by the platform routing tool.

use super::commands::{is_missing_route, native, CommandForm, RouteCommand};
use super::RouteTable;
use crate::error::{RouteError, RouteResult};
use std::net::Ipv4Addr;
use std::process::{Command, Output};

/// Runs `ip`, `route` or `netsh` for every operation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRouteTable;

impl SystemRouteTable {
    pub fn new() -> Self {
        SystemRouteTable
    }

    fn output(cmd: &RouteCommand) -> RouteResult<Output> {
        log::debug!("Running: {}", cmd);
        Ok(Command::new(cmd.program).args(&cmd.args).output()?)
    }

    fn run(cmd: RouteCommand) -> RouteResult<()> {
        let output = Self::output(&cmd)?;
        if !output.status.success() {
            return Err(RouteError::Command {
                command: cmd.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl RouteTable for SystemRouteTable {
    fn default_gateway(&mut self) -> RouteResult<Option<Ipv4Addr>> {
        let cmd = native::show_default();
        let output = Self::output(&cmd)?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_route(&stderr) || is_missing_route(&stdout) {
                return Ok(None);
            }
            return Err(RouteError::QueryFailed(format!("`{}`: {}", cmd, stderr.trim())));
        }
        Ok(native::parse_default(&stdout))
    }

    fn delete_default(&mut self) -> RouteResult<()> {
        Self::run(native::delete_default())
    }

    fn add_default(&mut self, gateway: Ipv4Addr, form: CommandForm) -> RouteResult<()> {
        Self::run(native::add_default(gateway, form))
    }

    fn add_host(&mut self, dest: Ipv4Addr, gateway: Ipv4Addr) -> RouteResult<()> {
        Self::run(native::add_host(dest, gateway))
    }

    fn delete_host(&mut self, dest: Ipv4Addr) -> RouteResult<()> {
        Self::run(native::delete_host(dest))
    }

    fn add_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> RouteResult<()> {
        Self::run(native::add_network(network, netmask, gateway))
    }

    fn delete_network(&mut self, network: Ipv4Addr, netmask: Ipv4Addr) -> RouteResult<()> {
        Self::run(native::delete_network(network, netmask))
    }
}
