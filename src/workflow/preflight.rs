use crate::cli::PreflightArgs;
use crate::error::Result;
use crate::exec::SystemRunner;
use crate::node::Node;
use crate::preflight::PreflightValidator;
use crate::workflow::context::{ConfigOverrides, RunContext};

/// Check the host without changing anything and print the resolved node.
pub fn run_preflight(args: &PreflightArgs) -> Result<Node> {
    let ctx = RunContext::load(args.config.as_deref(), ConfigOverrides::default())?;
    let node = PreflightValidator::new(&SystemRunner, &ctx.config).validate()?;
    println!("fqdn: {}", node.fqdn);
    println!("domain: {}", node.domain);
    let addresses: Vec<String> = node.addresses.iter().map(ToString::to_string).collect();
    println!("addresses: {}", addresses.join(", "));
    println!("admin address: {}", node.admin_address);
    println!("web UI: {}", node.access_url(ctx.config.web_port));
    Ok(node)
}
