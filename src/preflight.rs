//! Host preconditions checked before anything is mutated.
//!
//! Each check is a hard stop. The validator only reads: it inspects the
//! credential store, asks the resolver and the kernel about addresses, and
//! probes the firewall and reachability through external commands.
use crate::config::BootstrapConfig;
use crate::error::{PreflightError, Result};
use crate::exec::{command_line, template_program, CommandOutput, CommandRunner};
use crate::node::Node;
use anyhow::Context;
use regex::Regex;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::LazyLock;

static INTERFACE_ADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\binet6?\s+([0-9A-Fa-f:.]+)/\d+").expect("interface address regex")
});
static ACCEPT_POLICY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-P\s+\S+\s+ACCEPT$").expect("accept policy regex"));

pub struct PreflightValidator<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a BootstrapConfig,
}

impl<'a> PreflightValidator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a BootstrapConfig) -> Self {
        Self { runner, config }
    }

    /// Run every check in order and return the resolved node identity.
    pub fn validate(&self) -> Result<Node> {
        if self.config.preflight.require_root {
            check_root()?;
        }
        if self.config.preflight.check_tools {
            self.check_tools()?;
        }
        self.check_credential()?;
        let (fqdn, domain) = self.host_identity()?;
        let addresses = self.resolve(&fqdn)?;
        let admin_address = self.local_address(&fqdn, &addresses)?;
        self.check_firewall()?;
        self.check_reachable(&fqdn, admin_address)?;

        let node = Node {
            fqdn,
            domain,
            addresses,
            admin_address,
        };
        tracing::info!(node = %node, "preflight passed");
        Ok(node)
    }

    fn check_tools(&self) -> Result<()> {
        let commands = &self.config.commands;
        let templates = [
            &commands.chef_client,
            &commands.service,
            &commands.createrepo,
            &commands.hostname,
            &commands.dns_domain,
            &commands.resolve,
            &commands.interfaces,
            &commands.firewall,
            &commands.ping,
        ];
        for template in templates {
            let program = template_program(template)?;
            if which::which(&program).is_err() {
                return Err(PreflightError::MissingTool { name: program }.into());
            }
        }
        Ok(())
    }

    fn check_credential(&self) -> Result<()> {
        let path = &self.config.shadow_file;
        let shadow = std::fs::read_to_string(path)
            .with_context(|| format!("read credential store {}", path.display()))?;
        match credential_problem(&shadow) {
            Some(reason) => Err(PreflightError::CredentialUnusable {
                reason: reason.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    fn host_identity(&self) -> Result<(String, String)> {
        let hostname = self.capture(&self.config.commands.hostname, &[])?;
        if !hostname.success() {
            return Err(identity_error(format!("hostname lookup failed: {}", hostname.detail())));
        }
        let fqdn = hostname.stdout.trim().to_string();
        if fqdn.is_empty() {
            return Err(identity_error("hostname is empty".to_string()));
        }

        let domain_output = self.capture(&self.config.commands.dns_domain, &[])?;
        let domain = domain_output.stdout.trim().to_string();
        if !domain_output.success() || domain.is_empty() {
            return Err(identity_error(format!("{fqdn} has no DNS domain")));
        }
        if !fqdn.ends_with(&format!(".{domain}")) {
            return Err(identity_error(format!(
                "{fqdn} is not inside DNS domain {domain}"
            )));
        }
        Ok((fqdn, domain))
    }

    fn resolve(&self, fqdn: &str) -> Result<Vec<IpAddr>> {
        let output = self.capture(&self.config.commands.resolve, &[fqdn])?;
        let addresses = if output.success() {
            routable_addresses(&output.stdout)
        } else {
            Vec::new()
        };
        if addresses.is_empty() {
            return Err(PreflightError::Unresolvable {
                fqdn: fqdn.to_string(),
            }
            .into());
        }
        tracing::debug!(?addresses, "resolved admin hostname");
        Ok(addresses)
    }

    fn local_address(&self, fqdn: &str, addresses: &[IpAddr]) -> Result<IpAddr> {
        let output = self.capture(&self.config.commands.interfaces, &[])?;
        if !output.success() {
            return Err(identity_error(format!(
                "cannot list interfaces: {}",
                output.detail()
            )));
        }
        let local = interface_addresses(&output.stdout);
        addresses
            .iter()
            .copied()
            .find(|addr| local.contains(addr))
            .ok_or_else(|| {
                PreflightError::AddressNotLocal {
                    fqdn: fqdn.to_string(),
                    addresses: addresses
                        .iter()
                        .map(IpAddr::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                }
                .into()
            })
    }

    fn check_firewall(&self) -> Result<()> {
        let output = self.capture(&self.config.commands.firewall, &[])?;
        if !output.success() {
            return Err(PreflightError::FirewallActive {
                rule: format!("cannot inspect firewall: {}", output.detail()),
            }
            .into());
        }
        match first_restrictive_rule(&output.stdout) {
            Some(rule) => Err(PreflightError::FirewallActive { rule }.into()),
            None => Ok(()),
        }
    }

    fn check_reachable(&self, fqdn: &str, address: IpAddr) -> Result<()> {
        let address = address.to_string();
        for target in [address.as_str(), fqdn] {
            if self.capture(&self.config.commands.ping, &[target])?.success() {
                return Ok(());
            }
        }
        Err(PreflightError::Unreachable {
            target: format!("{fqdn} ({address})"),
        }
        .into())
    }

    fn capture(&self, template: &str, extra: &[&str]) -> Result<CommandOutput> {
        let argv = command_line(template, extra.iter().copied())?;
        self.runner.run(&argv)
    }
}

fn check_root() -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { libc::geteuid() };
    if uid != 0 {
        return Err(PreflightError::NotRoot { uid }.into());
    }
    Ok(())
}

fn identity_error(detail: String) -> crate::error::BootstrapError {
    PreflightError::HostIdentity { detail }.into()
}

/// Why the root entry of a shadow file cannot be used, if it cannot.
fn credential_problem(shadow: &str) -> Option<&'static str> {
    let Some(entry) = shadow.lines().find(|line| line.starts_with("root:")) else {
        return Some("missing");
    };
    let hash = entry.split(':').nth(1).unwrap_or_default();
    if hash.is_empty() {
        Some("unset")
    } else if hash.starts_with('!') || hash.starts_with('*') {
        Some("locked")
    } else {
        None
    }
}

/// Non-loopback addresses from resolver output, first column, deduplicated
/// in order.
fn routable_addresses(resolver_output: &str) -> Vec<IpAddr> {
    let mut seen = BTreeSet::new();
    resolver_output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|token| token.parse::<IpAddr>().ok())
        .filter(|addr| !addr.is_loopback() && !addr.is_unspecified())
        .filter(|addr| seen.insert(*addr))
        .collect()
}

fn interface_addresses(ip_output: &str) -> BTreeSet<IpAddr> {
    INTERFACE_ADDR
        .captures_iter(ip_output)
        .filter_map(|caps| caps.get(1))
        .filter_map(|addr| addr.as_str().parse::<IpAddr>().ok())
        .collect()
}

fn first_restrictive_rule(rules: &str) -> Option<String> {
    rules
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| !ACCEPT_POLICY.is_match(line))
        .map(str::to_string)
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
