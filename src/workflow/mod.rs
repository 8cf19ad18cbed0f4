//! Command workflows.
//!
//! Each `run_*` function wires host implementations for one subcommand;
//! the install steps themselves live on [`Orchestrator`] so they can run
//! against scripted collaborators.
mod context;
mod gate;
mod install;
mod preflight;
mod status;

pub use context::{ConfigOverrides, RunContext};
pub use gate::run_gate;
pub use install::{install_overrides, run_install, Orchestrator, RunSummary};
pub use preflight::run_preflight;
pub use status::{run_status, status_report, StatusReport, UnitStatus};
