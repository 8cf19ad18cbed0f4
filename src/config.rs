//! Bootstrap configuration.
//!
//! Everything the run needs to know about the host layout, the backend
//! command surface, and timing lives in one JSON document. Every field has
//! a default so an empty `{}` (or no file at all) describes a stock
//! production admin node.
use crate::error::{BootstrapError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current schema version for the bootstrap config file.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Repositories that are known to be incomplete on some installs.
pub const DEFAULT_SKIP_REPOS: [&str; 3] =
    ["Cloud-PTF", "SLES11-SP3-Updates", "SUSE-Cloud-3-Updates"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Packaged artifacts, strict checksum validation.
    #[default]
    Production,
    /// Local source trees, checksum comparison bypassed, test repos enabled.
    Development,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub path: PathBuf,
    /// Expected SHA-256 of the repository `content` manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Expected `<summary>` in the repository product metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Only validated in development mode.
    #[serde(default)]
    pub dev_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Regex matched against the status command output.
    #[serde(default = "default_healthy_pattern")]
    pub healthy_pattern: String,
}

/// Command templates, split with shell quoting rules before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub crowbar: String,
    pub chef_client: String,
    pub barclamp_install: String,
    pub service: String,
    pub createrepo: String,
    pub hostname: String,
    pub dns_domain: String,
    pub resolve: String,
    pub interfaces: String,
    pub firewall: String,
    pub ping: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            crowbar: "crowbar".to_string(),
            chef_client: "chef-client".to_string(),
            barclamp_install: "/opt/dell/bin/barclamp_install.rb".to_string(),
            service: "service".to_string(),
            createrepo: "createrepo".to_string(),
            hostname: "hostname -f".to_string(),
            dns_domain: "dnsdomainname".to_string(),
            resolve: "getent ahosts".to_string(),
            interfaces: "ip -o addr show".to_string(),
            firewall: "iptables -S".to_string(),
            ping: "ping -c 1 -w 3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub service_grace_secs: u64,
    pub proposal_attempts: u32,
    pub proposal_backoff_secs: u64,
    pub busy_poll_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            service_grace_secs: 5,
            proposal_attempts: 5,
            proposal_backoff_secs: 10,
            busy_poll_secs: 5,
        }
    }
}

impl TimingConfig {
    pub fn service_grace(&self) -> Duration {
        Duration::from_secs(self.service_grace_secs)
    }

    pub fn proposal_backoff(&self) -> Duration {
        Duration::from_secs(self.proposal_backoff_secs)
    }

    pub fn busy_poll(&self) -> Duration {
        Duration::from_secs(self.busy_poll_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    pub require_root: bool,
    /// Look up every configured command in PATH before the run.
    pub check_tools: bool,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            require_root: true,
            check_tools: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub schema_version: u32,
    pub mode: InstallMode,
    /// Root for the success marker, gate, install log, and machine key.
    pub state_root: PathBuf,
    /// Directory holding one `<unit>.yml` descriptor per installed unit.
    pub barclamp_dir: PathBuf,
    /// Unit source checkouts, used in development mode.
    pub source_tree: PathBuf,
    pub shadow_file: PathBuf,
    /// Lock file held by the periodic client while it converges.
    pub busy_lock: PathBuf,
    pub proposal_barclamp: String,
    pub proposal_name: String,
    pub proposal_attributes: PathBuf,
    /// Always installed first, unconditionally.
    pub framework_unit: String,
    /// Installed in this order after the framework.
    pub units: Vec<String>,
    pub repositories: Vec<RepositoryConfig>,
    /// Appended to [`DEFAULT_SKIP_REPOS`].
    pub skip_repos: Vec<String>,
    pub services: Vec<ServiceConfig>,
    pub commands: CommandTemplates,
    pub timing: TimingConfig,
    pub preflight: PreflightConfig,
    pub web_port: u16,
    pub verify_web_ui: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            mode: InstallMode::Production,
            state_root: PathBuf::from("/var/lib/crowbar"),
            barclamp_dir: PathBuf::from("/opt/dell/crowbar_framework/barclamps"),
            source_tree: PathBuf::from("/opt/dell/barclamps"),
            shadow_file: PathBuf::from("/etc/shadow"),
            busy_lock: PathBuf::from("/var/chef/cache/chef-client-running.pid"),
            proposal_barclamp: "crowbar".to_string(),
            proposal_name: "default".to_string(),
            proposal_attributes: PathBuf::from("/etc/crowbar/crowbar.json"),
            framework_unit: "crowbar".to_string(),
            units: default_units(),
            repositories: default_repositories(),
            skip_repos: Vec::new(),
            services: default_services(),
            commands: CommandTemplates::default(),
            timing: TimingConfig::default(),
            preflight: PreflightConfig::default(),
            web_port: 3000,
            verify_web_ui: true,
        }
    }
}

impl BootstrapConfig {
    /// Default skip set plus configured extras.
    pub fn skip_set(&self) -> BTreeSet<String> {
        DEFAULT_SKIP_REPOS
            .iter()
            .map(|name| name.to_string())
            .chain(self.skip_repos.iter().cloned())
            .collect()
    }

    /// Repositories validated in the configured mode.
    pub fn active_repositories(&self) -> impl Iterator<Item = &RepositoryConfig> {
        let development = self.mode == InstallMode::Development;
        self.repositories
            .iter()
            .filter(move |repo| development || !repo.dev_only)
    }
}

fn default_healthy_pattern() -> String {
    "running".to_string()
}

fn default_units() -> Vec<String> {
    [
        "deployer",
        "dns",
        "ipmi",
        "logging",
        "network",
        "ntp",
        "provisioner",
        "pacemaker",
        "database",
        "rabbitmq",
        "keystone",
        "swift",
        "ceph",
        "glance",
        "cinder",
        "neutron",
        "nova",
        "nova_dashboard",
        "heat",
        "ceilometer",
        "updater",
        "suse-manager-client",
        "nfs_client",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

fn default_services() -> Vec<ServiceConfig> {
    [
        "rabbitmq-server",
        "couchdb",
        "chef-solr",
        "chef-expander",
        "chef-server",
    ]
    .iter()
    .map(|name| ServiceConfig {
        name: name.to_string(),
        healthy_pattern: default_healthy_pattern(),
    })
    .collect()
}

fn default_repositories() -> Vec<RepositoryConfig> {
    let repos_root = Path::new("/srv/tftpboot/suse-11.3/repos");
    let repo = |name: &str, product: Option<&str>, dev_only: bool| RepositoryConfig {
        name: name.to_string(),
        path: repos_root.join(name),
        checksum: None,
        product: product.map(str::to_string),
        dev_only,
    };
    vec![
        repo(
            "SLES11-SP3-Pool",
            Some("SUSE Linux Enterprise Server 11 SP3"),
            false,
        ),
        repo(
            "SLES11-SP3-Updates",
            Some("SUSE Linux Enterprise Server 11 SP3"),
            false,
        ),
        repo("SUSE-Cloud-3-Pool", Some("SUSE Cloud 3"), false),
        repo("SUSE-Cloud-3-Updates", Some("SUSE Cloud 3"), false),
        repo("Cloud-PTF", None, false),
        repo("Devel-Cloud-3-Test", None, true),
    ]
}

/// Load a config file, or the defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<BootstrapConfig> {
    let Some(path) = path else {
        return Ok(BootstrapConfig::default());
    };
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: BootstrapConfig =
        serde_json::from_slice(&bytes).context("parse bootstrap config JSON")?;
    Ok(config)
}

/// Reject configs that would make the run ill-defined.
pub fn validate_config(config: &BootstrapConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(BootstrapError::Config(format!(
            "unsupported config schema_version {}",
            config.schema_version
        )));
    }
    if config.framework_unit.trim().is_empty() {
        return Err(BootstrapError::Config(
            "framework_unit must be non-empty".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for unit in &config.units {
        if unit.trim().is_empty() || unit.contains('/') {
            return Err(BootstrapError::Config(format!("invalid unit name {unit:?}")));
        }
        if unit == &config.framework_unit {
            return Err(BootstrapError::Config(format!(
                "{unit} is the framework unit and must not appear in units"
            )));
        }
        if !seen.insert(unit.as_str()) {
            return Err(BootstrapError::Config(format!("unit {unit} listed twice")));
        }
    }
    for repo in &config.repositories {
        if let Some(checksum) = repo.checksum.as_deref() {
            let is_sha256 =
                checksum.len() == 64 && checksum.bytes().all(|b| b.is_ascii_hexdigit());
            if !is_sha256 {
                return Err(BootstrapError::Config(format!(
                    "repository {} checksum must be a SHA-256 hex digest",
                    repo.name
                )));
            }
        }
    }
    for service in &config.services {
        regex::Regex::new(&service.healthy_pattern).map_err(|err| {
            BootstrapError::Config(format!(
                "service {} healthy_pattern is not a valid regex: {err}",
                service.name
            ))
        })?;
    }
    if config.timing.proposal_attempts == 0 {
        return Err(BootstrapError::Config(
            "timing.proposal_attempts must be at least 1".to_string(),
        ));
    }
    if config.proposal_name.trim().is_empty() || config.proposal_barclamp.trim().is_empty() {
        return Err(BootstrapError::Config(
            "proposal_barclamp and proposal_name must be non-empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
