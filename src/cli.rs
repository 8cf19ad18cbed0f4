//! CLI argument parsing for the admin node bootstrap.
//!
//! Flags only override config values; the config file (or its defaults)
//! describes the host.
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "admin-bootstrap",
    version,
    about = "Install and converge a Crowbar admin node",
    after_help = "Commands:\n  install                    Run the full admin node installation\n  preflight                  Check host preconditions only\n  status                     Summarize persisted install state\n  gate <acquire|release|status>  Control the deployment gate\n\nExamples:\n  admin-bootstrap preflight\n  admin-bootstrap install --config /etc/crowbar/bootstrap.json\n  admin-bootstrap install --from-source --source-tree /opt/dell/barclamps\n  admin-bootstrap status --json\n  admin-bootstrap gate release",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Install(InstallArgs),
    Preflight(PreflightArgs),
    Status(StatusArgs),
    Gate(GateArgs),
}

#[derive(Parser, Debug, Default)]
#[command(about = "Run the full admin node installation")]
pub struct InstallArgs {
    /// Install barclamps from source checkouts instead of packages
    #[arg(long)]
    pub from_source: bool,

    /// Bootstrap config JSON (defaults describe a stock admin node)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Attributes file for the crowbar proposal
    #[arg(long, value_name = "PATH")]
    pub proposal_attributes: Option<PathBuf>,

    /// Barclamp source checkouts, used with --from-source
    #[arg(long, value_name = "DIR")]
    pub source_tree: Option<PathBuf>,

    /// Repository allowed to be incomplete (repeatable)
    #[arg(long, value_name = "NAME")]
    pub skip_repo: Vec<String>,

    /// Root for markers, the install log, and the machine key
    #[arg(long, value_name = "DIR")]
    pub state_root: Option<PathBuf>,

    /// Do not probe the web UI after installation
    #[arg(long)]
    pub no_web_check: bool,

    /// Log at debug level and disable the progress spinner
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug, Default)]
#[command(about = "Check host preconditions without changing anything")]
pub struct PreflightArgs {
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug, Default)]
#[command(about = "Summarize persisted install state and next action")]
pub struct StatusArgs {
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub state_root: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Acquire, release, or inspect the deployment gate")]
pub struct GateArgs {
    #[arg(value_enum)]
    pub action: GateAction,

    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub state_root: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GateAction {
    Acquire,
    Release,
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_flags_parse() {
        let root = RootArgs::try_parse_from([
            "admin-bootstrap",
            "install",
            "--from-source",
            "--skip-repo",
            "SLE-HA",
            "--skip-repo",
            "SLE-SDK",
            "--no-web-check",
        ])
        .expect("parse");
        let Command::Install(args) = root.command else {
            panic!("expected install");
        };
        assert!(args.from_source);
        assert!(args.no_web_check);
        assert_eq!(args.skip_repo, vec!["SLE-HA", "SLE-SDK"]);
        assert!(args.config.is_none());
    }

    #[test]
    fn gate_takes_a_positional_action() {
        let root = RootArgs::try_parse_from(["admin-bootstrap", "gate", "release"]).expect("parse");
        match root.command {
            Command::Gate(args) => assert_eq!(args.action, GateAction::Release),
            other => panic!("unexpected {other:?}"),
        }
        assert!(RootArgs::try_parse_from(["admin-bootstrap", "gate", "toggle"]).is_err());
    }
}
