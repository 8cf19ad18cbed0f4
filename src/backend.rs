//! Configuration-management backend command surface.
//!
//! The orchestration only needs a handful of backend operations; they are
//! collected in [`Backend`] and implemented over the `crowbar` and
//! `chef-client` command line tools by [`CrowbarCli`].
use crate::error::{BootstrapError, Result};
use crate::exec::{command_line, CommandOutput, CommandRunner};
use crate::transition::LifecycleState;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use thiserror::Error as ThisError;

/// A backend command that ran and reported failure, or could not run.
#[derive(Debug, ThisError)]
#[error("`{command}` failed: {detail}")]
pub struct BackendError {
    pub command: String,
    pub detail: String,
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Proposal document as shown by the backend.
pub type ProposalDocument = Value;

pub trait Backend {
    fn list_proposals(&self, barclamp: &str) -> BackendResult<Vec<String>>;
    fn create_proposal(&self, barclamp: &str, name: &str, attributes: &Path) -> BackendResult<()>;
    fn show_proposal(&self, barclamp: &str, name: &str) -> BackendResult<ProposalDocument>;
    fn commit_proposal(&self, barclamp: &str, name: &str) -> BackendResult<()>;
    /// Show a named backend resource, e.g. the `default` network config.
    fn show_resource(&self, barclamp: &str, name: &str) -> BackendResult<Value>;
    fn show_node(&self, fqdn: &str) -> BackendResult<Value>;
    fn transition(&self, fqdn: &str, state: LifecycleState) -> BackendResult<()>;
    /// One synchronous convergence run of the configuration client.
    fn run_client(&self) -> BackendResult<()>;
}

pub struct CrowbarCli<'a> {
    runner: &'a dyn CommandRunner,
    crowbar: String,
    chef_client: String,
}

impl<'a> CrowbarCli<'a> {
    pub fn new(runner: &'a dyn CommandRunner, crowbar: &str, chef_client: &str) -> Result<Self> {
        // Surface template errors at construction rather than mid-run.
        command_line(crowbar, std::iter::empty::<String>())?;
        command_line(chef_client, std::iter::empty::<String>())?;
        Ok(Self {
            runner,
            crowbar: crowbar.to_string(),
            chef_client: chef_client.to_string(),
        })
    }

    fn crowbar(&self, args: &[&str]) -> BackendResult<String> {
        self.checked(&self.crowbar, args)
    }

    fn checked(&self, template: &str, args: &[&str]) -> BackendResult<String> {
        let argv = command_line(template, args.iter().copied()).map_err(|err| BackendError {
            command: template.to_string(),
            detail: err.to_string(),
        })?;
        let command = argv.join(" ");
        let start = Instant::now();
        let output = self.runner.run(&argv).map_err(|err| BackendError {
            command: command.clone(),
            detail: err.to_string(),
        })?;
        tracing::debug!(
            command = %command,
            elapsed_ms = start.elapsed().as_millis(),
            status = ?output.status,
            "backend command complete"
        );
        require_success(command, output)
    }

    fn crowbar_json(&self, args: &[&str]) -> BackendResult<Value> {
        let stdout = self.crowbar(args)?;
        serde_json::from_str(&stdout).map_err(|err| BackendError {
            command: format!("crowbar {}", args.join(" ")),
            detail: format!("invalid JSON output: {err}"),
        })
    }
}

fn require_success(command: String, output: CommandOutput) -> BackendResult<String> {
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(BackendError {
            command,
            detail: output.detail(),
        })
    }
}

impl Backend for CrowbarCli<'_> {
    fn list_proposals(&self, barclamp: &str) -> BackendResult<Vec<String>> {
        let stdout = self.crowbar(&[barclamp, "proposal", "list"])?;
        Ok(parse_proposal_list(&stdout))
    }

    fn create_proposal(&self, barclamp: &str, name: &str, attributes: &Path) -> BackendResult<()> {
        let file = attributes.to_string_lossy().to_string();
        self.crowbar(&[barclamp, "proposal", "create", name, "--file", file.as_str()])
            .map(drop)
    }

    fn show_proposal(&self, barclamp: &str, name: &str) -> BackendResult<ProposalDocument> {
        self.crowbar_json(&[barclamp, "proposal", "show", name])
    }

    fn commit_proposal(&self, barclamp: &str, name: &str) -> BackendResult<()> {
        self.crowbar(&[barclamp, "proposal", "commit", name])
            .map(drop)
    }

    fn show_resource(&self, barclamp: &str, name: &str) -> BackendResult<Value> {
        self.crowbar_json(&[barclamp, "show", name])
    }

    fn show_node(&self, fqdn: &str) -> BackendResult<Value> {
        self.crowbar_json(&["machines", "show", fqdn])
    }

    fn transition(&self, fqdn: &str, state: LifecycleState) -> BackendResult<()> {
        self.crowbar(&["machines", "transition", fqdn, state.as_str()])
            .map(drop)
    }

    fn run_client(&self) -> BackendResult<()> {
        self.checked(&self.chef_client, &[]).map(drop)
    }
}

/// Proposal names from `proposal list` output.
fn parse_proposal_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("No current proposals"))
        .map(str::to_string)
        .collect()
}

impl From<BackendError> for BootstrapError {
    fn from(err: BackendError) -> Self {
        BootstrapError::Other(anyhow::Error::new(err))
    }
}
