//! Error taxonomy for a bootstrap run.
//!
//! Every fatal condition maps to one variant so the top-level command can
//! render a single diagnostic and choose the exit code.
use crate::transition::LifecycleState;
use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Result alias used by the orchestration components.
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

/// A host precondition that failed before anything was mutated.
#[derive(Debug, ThisError)]
pub enum PreflightError {
    #[error("bootstrap must run as root (effective uid {uid})")]
    NotRoot { uid: u32 },
    #[error("required executable {name:?} not found in PATH")]
    MissingTool { name: String },
    #[error("administrative credential is {reason}; set a root password before installing")]
    CredentialUnusable { reason: String },
    #[error("hostname is not fully qualified: {detail}")]
    HostIdentity { detail: String },
    #[error("{fqdn} does not resolve to a routable address")]
    Unresolvable { fqdn: String },
    #[error("{fqdn} resolves to {addresses}, none of which is configured on a local interface")]
    AddressNotLocal { fqdn: String, addresses: String },
    #[error("firewall is active: {rule}")]
    FirewallActive { rule: String },
    #[error("{target} does not answer ping")]
    Unreachable { target: String },
}

#[derive(Debug, ThisError)]
pub enum BootstrapError {
    #[error("preflight failed: {0}")]
    Preflight(#[from] PreflightError),

    #[error("repository {repo} is not set up: {} missing", marker.display())]
    NotSetUp { repo: String, marker: PathBuf },

    #[error("repository {repo} content mismatch: expected checksum {expected}, found {actual}")]
    ContentMismatch {
        repo: String,
        expected: String,
        actual: String,
    },

    #[error("repository {repo} does not provide product {expected:?} (found {found:?})")]
    ProductMismatch {
        repo: String,
        expected: String,
        found: Vec<String>,
    },

    #[error("failed to start service {service}: {detail}")]
    ServiceStart { service: String, detail: String },

    #[error("failed to install {unit}: {detail}")]
    Install { unit: String, detail: String },

    #[error("failed to create proposal {proposal} after {attempts} attempts: {detail}")]
    ProposalCreate {
        proposal: String,
        attempts: u32,
        detail: String,
    },

    #[error("failed to commit proposal {proposal}: {detail}")]
    ProposalCommit { proposal: String, detail: String },

    #[error("transition to {state} failed: {detail}")]
    Transition {
        state: LifecycleState,
        detail: String,
    },

    #[error("final verification failed: {0}")]
    Verification(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BootstrapError {
    /// Short machine-readable tag used in logs and the JSON status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Preflight(_) => "preflight",
            Self::NotSetUp { .. } => "repo_not_set_up",
            Self::ContentMismatch { .. } => "content_mismatch",
            Self::ProductMismatch { .. } => "product_mismatch",
            Self::ServiceStart { .. } => "service_start",
            Self::Install { .. } => "install",
            Self::ProposalCreate { .. } => "proposal_create",
            Self::ProposalCommit { .. } => "proposal_commit",
            Self::Transition { .. } => "transition",
            Self::Verification(_) => "verification",
            Self::Spawn { .. } => "spawn",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }
}
