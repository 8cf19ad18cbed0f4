use crate::cli::{GateAction, GateArgs};
use crate::error::Result;
use crate::gate::DeploymentGate;
use crate::store::FileStateStore;
use crate::workflow::context::{ConfigOverrides, RunContext};

/// Operator control of the deployment gate. Returns whether the gate is
/// held afterwards.
pub fn run_gate(args: &GateArgs) -> Result<bool> {
    let ctx = RunContext::load(
        args.config.as_deref(),
        ConfigOverrides {
            state_root: args.state_root.clone(),
            ..ConfigOverrides::default()
        },
    )?;
    let store = FileStateStore::new(ctx.paths.state_root().to_path_buf());
    let gate = DeploymentGate::new(&store);

    match args.action {
        GateAction::Acquire => gate.acquire()?,
        GateAction::Release => gate.release()?,
        GateAction::Status => {}
    }
    let held_for = gate.held_for()?;
    match held_for {
        Some(age) => println!(
            "deployment gate held for {}s ({})",
            age.as_secs(),
            ctx.paths.gate_marker().display()
        ),
        None => println!("deployment gate open"),
    }
    Ok(held_for.is_some())
}
