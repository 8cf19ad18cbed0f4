//! Status of the persisted install state.
//!
//! Reads markers only; never touches the backend.
use crate::cli::StatusArgs;
use crate::config::BootstrapConfig;
use crate::error::Result;
use crate::gate::DeploymentGate;
use crate::paths::{HostPaths, SUCCESS_KEY};
use crate::store::{epoch_ms, FileStateStore, StateStore};
use crate::workflow::context::{ConfigOverrides, RunContext};
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub name: String,
    pub installed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub state_root: PathBuf,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at_epoch_ms: Option<u128>,
    pub gate_held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_held_secs: Option<u64>,
    pub client_busy: bool,
    pub machine_key_present: bool,
    pub units: Vec<UnitStatus>,
    pub next_action: String,
}

/// Build a status report from the markers under `paths`.
pub fn status_report(
    config: &BootstrapConfig,
    paths: &HostPaths,
    store: &dyn StateStore,
) -> Result<StatusReport> {
    let installed_at = store.set_since(SUCCESS_KEY)?;
    let gate_age = DeploymentGate::new(store).held_for()?;
    let client_busy = store.is_set(&config.busy_lock.to_string_lossy())?;

    let units = std::iter::once(&config.framework_unit)
        .chain(config.units.iter())
        .map(|name| UnitStatus {
            name: name.clone(),
            installed: paths.unit_marker(name).is_file(),
        })
        .collect();

    let next_action = match (installed_at.is_some(), gate_age.is_some()) {
        (true, false) => "none; admin node installed".to_string(),
        (_, true) => "an install run stopped while holding the deployment gate; fix the \
                      reported cause and re-run `admin-bootstrap install`, or clear it with \
                      `admin-bootstrap gate release`"
            .to_string(),
        (false, false) => "run `admin-bootstrap install`".to_string(),
    };

    Ok(StatusReport {
        state_root: paths.state_root().to_path_buf(),
        installed: installed_at.is_some(),
        installed_at_epoch_ms: installed_at.map(epoch_ms),
        gate_held: gate_age.is_some(),
        gate_held_secs: gate_age.map(|age| age.as_secs()),
        client_busy,
        machine_key_present: paths.machine_key().is_file(),
        units,
        next_action,
    })
}

pub fn run_status(args: &StatusArgs) -> Result<StatusReport> {
    let ctx = RunContext::load(
        args.config.as_deref(),
        ConfigOverrides {
            state_root: args.state_root.clone(),
            ..ConfigOverrides::default()
        },
    )?;
    let store = FileStateStore::new(ctx.paths.state_root().to_path_buf());
    let report = status_report(&ctx.config, &ctx.paths, &store)?;

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize status")?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &StatusReport) {
    println!("state root: {}", report.state_root.display());
    println!("installed: {}", if report.installed { "yes" } else { "no" });
    match report.gate_held_secs {
        Some(secs) => println!("deployment gate: held for {secs}s"),
        None => println!("deployment gate: open"),
    }
    if report.client_busy {
        println!("client: running");
    }
    println!(
        "machine key: {}",
        if report.machine_key_present {
            "present"
        } else {
            "missing"
        }
    );
    let installed = report.units.iter().filter(|unit| unit.installed).count();
    println!("barclamps: {installed}/{} installed", report.units.len());
    let missing: Vec<&str> = report
        .units
        .iter()
        .filter(|unit| !unit.installed)
        .map(|unit| unit.name.as_str())
        .collect();
    if !missing.is_empty() {
        println!("missing: {}", missing.join(", "));
    }
    println!("next: {}", report.next_action);
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
