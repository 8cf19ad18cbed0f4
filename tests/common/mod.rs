//! Shared test infrastructure for integration tests.
//!
//! A `TestHost` lays out a complete admin node under a temp dir: shadow
//! file, package repositories, barclamp dir, proposal attributes, and state
//! root. Commands are answered by a `ScriptedRunner` so the run exercises
//! the real `crowbar` command surface without a backend.

use admin_bootstrap::backend::CrowbarCli;
use admin_bootstrap::config::{BootstrapConfig, RepositoryConfig, ServiceConfig};
use admin_bootstrap::error::Result;
use admin_bootstrap::exec::CommandOutput;
use admin_bootstrap::paths::HostPaths;
use admin_bootstrap::repos::sha256_hex;
use admin_bootstrap::store::FileStateStore;
use admin_bootstrap::testing::{script_healthy_host, write_unlocked_shadow, RecordingSleeper, ScriptedRunner};
use admin_bootstrap::workflow::{Orchestrator, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FQDN: &str = "admin.cloud.test";
pub const ADDRESS: &str = "192.168.124.10";

pub struct TestHost {
    pub dir: TempDir,
    pub config: BootstrapConfig,
    pub paths: HostPaths,
}

impl TestHost {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();

        let shadow = root.join("shadow");
        write_unlocked_shadow(&shadow);
        let attributes = root.join("crowbar.json");
        fs::write(&attributes, r#"{"attributes":{"crowbar":{"instances":{}}}}"#)
            .expect("write attributes");
        fs::create_dir_all(root.join("barclamps")).expect("barclamp dir");

        let repos = root.join("repos");
        let repositories = vec![
            write_repo(&repos, "SLES11-SP3-Pool", "SUSE Linux Enterprise Server 11 SP3"),
            write_repo(&repos, "SUSE-Cloud-3-Pool", "SUSE Cloud 3"),
            RepositoryConfig {
                name: "Cloud-PTF".to_string(),
                path: repos.join("Cloud-PTF"),
                checksum: None,
                product: None,
                dev_only: false,
            },
        ];
        // Cloud-PTF is usually an empty PTF channel; give it metadata so the
        // default run finds a set-up repository.
        fs::create_dir_all(repos.join("Cloud-PTF/repodata")).expect("ptf repodata");
        fs::write(repos.join("Cloud-PTF/repodata/repomd.xml"), "<repomd/>").expect("ptf repomd");
        fs::write(
            repos.join("Cloud-PTF/repodata/00-products.xml"),
            "<products><product><summary>PTF</summary></product></products>",
        )
        .expect("ptf products");

        let mut config = BootstrapConfig {
            state_root: root.join("state"),
            barclamp_dir: root.join("barclamps"),
            source_tree: root.join("src"),
            shadow_file: shadow,
            busy_lock: root.join("chef-client-running.pid"),
            proposal_attributes: attributes,
            units: ["deployer", "dns", "network"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            repositories,
            services: vec![ServiceConfig {
                name: "couchdb".to_string(),
                healthy_pattern: "running".to_string(),
            }],
            verify_web_ui: false,
            ..BootstrapConfig::default()
        };
        config.preflight.require_root = false;
        config.preflight.check_tools = false;

        let paths = HostPaths::new(config.state_root.clone(), config.barclamp_dir.clone());
        Self { dir, config, paths }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn repo_path(&self, name: &str) -> PathBuf {
        self.root().join("repos").join(name)
    }

    pub fn mark_installed(&self, unit: &str) {
        fs::write(self.paths.unit_marker(unit), format!("barclamp:\n  name: {unit}\n"))
            .expect("unit marker");
    }

    /// Run the install against `runner` with the real `crowbar` CLI layer.
    pub fn run(&self, runner: &ScriptedRunner, sleeper: &RecordingSleeper) -> Result<RunSummary> {
        let backend = CrowbarCli::new(runner, "crowbar", "chef-client")?;
        let store = FileStateStore::new(self.paths.state_root().to_path_buf());
        Orchestrator::new(&self.config, &self.paths, runner, &backend, &store, sleeper).run()
    }
}

fn write_repo(root: &Path, name: &str, product: &str) -> RepositoryConfig {
    let path = root.join(name);
    fs::create_dir_all(path.join("repodata")).expect("repodata");
    fs::write(path.join("repodata/repomd.xml"), "<repomd/>").expect("repomd");
    fs::write(
        path.join("repodata/4f2a-products.xml"),
        format!("<products><product><summary>{product}</summary></product></products>"),
    )
    .expect("products");
    let content = format!("PRODUCT {name}\nLABEL {product}\n");
    fs::write(path.join("content"), &content).expect("content");
    RepositoryConfig {
        name: name.to_string(),
        path,
        checksum: Some(sha256_hex(content.as_bytes())),
        product: Some(product.to_string()),
        dev_only: false,
    }
}

/// Runner for a healthy host whose backend accepts everything. Call
/// `overrides` rules take precedence, since the first matching rule wins.
pub fn scripted_runner(overrides: impl FnOnce(&ScriptedRunner)) -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    overrides(&runner);
    script_healthy_host(&runner, FQDN, ADDRESS);
    runner
        .on(
            "service",
            CommandOutput::ok("Checking for service couchdb: running\n"),
        )
        .on(
            "crowbar crowbar proposal list",
            CommandOutput::ok("No current proposals.\n"),
        )
        .on(
            "crowbar crowbar proposal show default",
            CommandOutput::ok(format!(
                r#"{{"id":"bc-crowbar-default","deployment":{{"crowbar":{{"elements":{{"crowbar":["{FQDN}"]}}}}}}}}"#
            )),
        )
        .on(
            &format!("crowbar machines show {FQDN}"),
            CommandOutput::ok(format!(r#"{{"name":"{FQDN}","state":"ready"}}"#)),
        )
        .on(
            "crowbar network show default",
            CommandOutput::ok(format!(
                r#"{{"attributes":{{"network":{{"networks":{{"admin":{{"ranges":{{"admin":{{"start":"{ADDRESS}","end":"192.168.124.11"}}}}}}}}}}}}}}"#
            )),
        );
    runner
}

/// Convergence runs made outside the one-per-state walk.
pub fn client_kicks(runner: &ScriptedRunner, states_walked: usize) -> usize {
    runner.calls_starting_with("chef-client").len() - states_walked
}
