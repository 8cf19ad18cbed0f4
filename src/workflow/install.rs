//! The full admin node install run.
//!
//! Steps run strictly in sequence and every failure ends the run. Markers
//! written by completed steps stay in place, so re-running after a fix
//! skips what is already done.
use crate::backend::{Backend, CrowbarCli};
use crate::cli::InstallArgs;
use crate::config::{BootstrapConfig, InstallMode};
use crate::error::{BootstrapError, Result};
use crate::exec::{CommandRunner, SystemRunner};
use crate::gate::DeploymentGate;
use crate::identity::ensure_machine_key;
use crate::node::{access_url, Node};
use crate::paths::{HostPaths, SUCCESS_KEY};
use crate::preflight::PreflightValidator;
use crate::progress::Spinner;
use crate::proposal::{proposal_lists_node, ProposalCreation, ProposalManager};
use crate::repos::{RepoOutcome, RepositoryValidator};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::services::{ServiceOutcome, ServiceSupervisor};
use crate::store::{FileStateStore, StateStore};
use crate::transition::{LifecycleState, TransitionHooks, TransitionStateMachine};
use crate::units::{ordered_units, InstallOptions, InstallReport, UnitInstaller};
use crate::verify::{admin_address_from_network, probe_web_ui};
use crate::workflow::context::{ConfigOverrides, RunContext};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

const WEB_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub node: Node,
    pub access_url: String,
    pub repositories: Vec<(String, RepoOutcome)>,
    pub services_started: Vec<String>,
    pub units: InstallReport,
    pub proposal_created: bool,
    pub states: Vec<LifecycleState>,
    pub elapsed_ms: u128,
}

pub struct Orchestrator<'a> {
    config: &'a BootstrapConfig,
    paths: &'a HostPaths,
    runner: &'a dyn CommandRunner,
    backend: &'a dyn Backend,
    store: &'a dyn StateStore,
    sleeper: &'a dyn Sleeper,
    progress: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a BootstrapConfig,
        paths: &'a HostPaths,
        runner: &'a dyn CommandRunner,
        backend: &'a dyn Backend,
        store: &'a dyn StateStore,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            paths,
            runner,
            backend,
            store,
            sleeper,
            progress: false,
        }
    }

    /// Draw a spinner on stderr while each step runs.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        tracing::info!(mode = ?self.config.mode, "install run starting");

        let node = self.step("checking host", || {
            PreflightValidator::new(self.runner, self.config).validate()
        })?;
        ensure_machine_key(&self.paths.machine_key(), &node.fqdn)?;
        let repositories = self.step("checking repositories", || self.check_repositories())?;
        let services_started = self.step("starting services", || self.start_services())?;
        let units = self.step("installing barclamps", || self.install_units())?;

        let gate = DeploymentGate::new(self.store);
        gate.acquire()?;
        let proposal_created = self.step("applying proposal", || self.apply_proposal())?;
        let states = self.step("walking node states", || self.walk_states(&node))?;
        gate.release()?;

        self.store.set(SUCCESS_KEY)?;
        let access_url = self.step("verifying installation", || self.verify(&node))?;

        let elapsed_ms = start.elapsed().as_millis();
        tracing::info!(elapsed_ms, url = %access_url, "install run complete");
        Ok(RunSummary {
            node,
            access_url,
            repositories,
            services_started,
            units,
            proposal_created,
            states,
            elapsed_ms,
        })
    }

    /// Run one step with the spinner up; the spinner is gone before the
    /// result, success or error, reaches the caller.
    fn step<T>(&self, label: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let spinner = Spinner::start(label, self.progress);
        let result = op();
        spinner.finish();
        let elapsed_ms = start.elapsed().as_millis();
        match &result {
            Ok(_) => tracing::debug!(step = label, elapsed_ms, "step complete"),
            Err(err) => tracing::debug!(step = label, elapsed_ms, kind = err.kind(), "step failed"),
        }
        result
    }

    fn check_repositories(&self) -> Result<Vec<(String, RepoOutcome)>> {
        let validator = RepositoryValidator::new(
            self.runner,
            self.config.mode,
            self.config.skip_set(),
            &self.config.commands.createrepo,
        );
        validator.validate_all(self.config.active_repositories())
    }

    fn start_services(&self) -> Result<Vec<String>> {
        let supervisor = ServiceSupervisor::new(
            self.runner,
            self.sleeper,
            &self.config.commands.service,
            self.config.timing.service_grace(),
        );
        let mut started = Vec::new();
        for service in &self.config.services {
            let healthy = Regex::new(&service.healthy_pattern).map_err(|err| {
                BootstrapError::Config(format!("service {} pattern: {err}", service.name))
            })?;
            if supervisor.ensure_running(&service.name, &healthy)? == ServiceOutcome::Started {
                started.push(service.name.clone());
            }
        }
        Ok(started)
    }

    fn install_units(&self) -> Result<InstallReport> {
        let installer = UnitInstaller::new(
            self.runner,
            self.paths,
            InstallOptions {
                mode: self.config.mode,
                source_tree: self.config.source_tree.clone(),
                install_command: self.config.commands.barclamp_install.clone(),
            },
        );
        installer.install_all(&self.config.framework_unit, &ordered_units(&self.config.units))
    }

    /// Create the proposal if needed and commit it. An existing proposal was
    /// committed by the run that created it and is left alone.
    fn apply_proposal(&self) -> Result<bool> {
        let manager = self.proposals();
        let name = &self.config.proposal_name;
        match manager.ensure_created(name, &self.config.proposal_attributes)? {
            ProposalCreation::Created { .. } => {
                manager.commit(name)?;
                Ok(true)
            }
            ProposalCreation::AlreadyExists => Ok(false),
        }
    }

    fn proposals(&self) -> ProposalManager<'a> {
        ProposalManager::new(
            self.backend,
            self.sleeper,
            &self.config.proposal_barclamp,
            RetryPolicy {
                attempts: self.config.timing.proposal_attempts,
                backoff: self.config.timing.proposal_backoff(),
            },
        )
    }

    fn walk_states(&self, node: &Node) -> Result<Vec<LifecycleState>> {
        let busy_lock = self.config.busy_lock.to_string_lossy();
        TransitionStateMachine::new(
            self.backend,
            self.store,
            self.sleeper,
            &busy_lock,
            self.config.timing.busy_poll(),
        )
        .with_hooks(self.builtin_hooks())
        .run(node)
    }

    fn builtin_hooks(&self) -> TransitionHooks<'a> {
        let backend = self.backend;
        let manager = self.proposals();
        let barclamp = self.config.proposal_barclamp.clone();
        let proposal = self.config.proposal_name.clone();
        let mut hooks = TransitionHooks::new();
        hooks
            .register(LifecycleState::Installed, move |node| {
                let document = manager.show(&proposal).map_err(|err| err.to_string())?;
                if proposal_lists_node(&document, &node.fqdn) {
                    Ok(())
                } else {
                    Err(format!(
                        "{} is not deployed by proposal {barclamp}/{proposal}",
                        node.fqdn
                    ))
                }
            })
            .register(LifecycleState::Ready, move |node| {
                let resource = backend
                    .show_node(&node.fqdn)
                    .map_err(|err| err.to_string())?;
                match resource.get("state").and_then(Value::as_str) {
                    Some(state) if state == LifecycleState::Ready.as_str() => Ok(()),
                    other => Err(format!(
                        "backend reports {} in state {}",
                        node.fqdn,
                        other.unwrap_or("unknown")
                    )),
                }
            });
        hooks
    }

    fn verify(&self, node: &Node) -> Result<String> {
        let network = self
            .backend
            .show_resource("network", "default")
            .map_err(|err| BootstrapError::Verification(err.to_string()))?;
        let address = admin_address_from_network(&network).unwrap_or_else(|| {
            tracing::debug!("network proposal has no admin range; using resolved address");
            node.admin_address
        });
        let url = access_url(address, self.config.web_port);
        if self.config.verify_web_ui {
            probe_web_ui(&url, WEB_PROBE_TIMEOUT)?;
        }
        Ok(url)
    }
}

/// Wire the host implementations and run the install from the CLI.
pub fn run_install(ctx: &RunContext, args: &InstallArgs) -> Result<RunSummary> {
    let runner = SystemRunner;
    let backend = CrowbarCli::new(
        &runner,
        &ctx.config.commands.crowbar,
        &ctx.config.commands.chef_client,
    )?;
    let store = FileStateStore::new(ctx.paths.state_root().to_path_buf());
    let sleeper = ThreadSleeper;

    let summary = Orchestrator::new(&ctx.config, &ctx.paths, &runner, &backend, &store, &sleeper)
        .with_progress(!args.verbose)
        .run()?;
    print_summary(&summary);
    Ok(summary)
}

pub fn install_overrides(args: &InstallArgs) -> ConfigOverrides {
    ConfigOverrides {
        mode: args.from_source.then_some(InstallMode::Development),
        proposal_attributes: args.proposal_attributes.clone(),
        source_tree: args.source_tree.clone(),
        skip_repos: args.skip_repo.clone(),
        state_root: args.state_root.clone(),
        verify_web_ui: args.no_web_check.then_some(false),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("admin node {} is ready", summary.node);
    println!(
        "barclamps: {} installed, {} already present",
        summary.units.installed.len(),
        summary.units.skipped.len()
    );
    let synthesized: Vec<&str> = summary
        .repositories
        .iter()
        .filter(|(_, outcome)| *outcome == RepoOutcome::Synthesized)
        .map(|(name, _)| name.as_str())
        .collect();
    if !synthesized.is_empty() {
        println!("empty repositories generated: {}", synthesized.join(", "));
    }
    if !summary.proposal_created {
        println!("proposal already existed; left as found");
    }
    println!("elapsed: {}s", summary.elapsed_ms / 1000);
    println!("web UI: {}", summary.access_url);
}
