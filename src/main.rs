use admin_bootstrap::cli::{Command, InstallArgs, RootArgs};
use admin_bootstrap::error::{BootstrapError, Result};
use admin_bootstrap::logging;
use admin_bootstrap::workflow::{self, install_overrides, RunContext};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let root = RootArgs::parse();
    match run(root.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(kind = err.kind(), error = %err, "bootstrap failed");
            report(&err);
            exit_code(&err)
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Install(args) => install(&args),
        Command::Preflight(args) => {
            logging::init(args.verbose, None)?;
            workflow::run_preflight(&args).map(drop)
        }
        Command::Status(args) => {
            logging::init(false, None)?;
            workflow::run_status(&args).map(drop)
        }
        Command::Gate(args) => {
            logging::init(false, None)?;
            workflow::run_gate(&args).map(drop)
        }
    }
}

/// The install log lives under the configured state root, so the config is
/// loaded before logging starts.
fn install(args: &InstallArgs) -> Result<()> {
    let ctx = RunContext::load(args.config.as_deref(), install_overrides(args))?;
    logging::init(args.verbose, Some(&ctx.paths.install_log()))?;
    workflow::run_install(&ctx, args).map(drop)
}

fn report(err: &BootstrapError) {
    let rendered = err.to_string();
    eprintln!("error: {rendered}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            eprintln!("  caused by: {cause_text}");
        }
        source = cause.source();
    }
}

fn exit_code(err: &BootstrapError) -> ExitCode {
    match err {
        BootstrapError::Config(_) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
