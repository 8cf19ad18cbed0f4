//! In-memory stand-ins for the host: scripted commands, recorded pauses,
//! a marker store whose locks can be held for a number of polls, and a
//! backend with injectable failures.
//!
//! Shared by the unit tests and the `tests/` integration suite.
use crate::backend::{Backend, BackendError, BackendResult, ProposalDocument};
use crate::error::Result;
use crate::exec::{CommandOutput, CommandRunner};
use crate::retry::Sleeper;
use crate::store::StateStore;
use crate::transition::LifecycleState;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::{Duration, SystemTime};

struct Rule {
    prefix: String,
    queued: VecDeque<CommandOutput>,
    fallback: CommandOutput,
}

/// Answers command lines by prefix. The first matching rule wins; queued
/// responses are consumed in order before the rule's fallback repeats.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `prefix` with `output`.
    pub fn on(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.on_sequence(prefix, Vec::new(), output)
    }

    /// Answer `prefix` with `queued` in order, then `fallback` forever.
    pub fn on_sequence(
        &self,
        prefix: &str,
        queued: Vec<CommandOutput>,
        fallback: CommandOutput,
    ) -> &Self {
        self.rules.borrow_mut().push(Rule {
            prefix: prefix.to_string(),
            queued: queued.into(),
            fallback,
        });
        self
    }

    /// Every command line run so far, space-joined.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let line = argv.join(" ");
        self.calls.borrow_mut().push(line.clone());
        let mut rules = self.rules.borrow_mut();
        let output = rules
            .iter_mut()
            .find(|rule| line.starts_with(&rule.prefix))
            .map(|rule| {
                rule.queued
                    .pop_front()
                    .unwrap_or_else(|| rule.fallback.clone())
            })
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }
}

/// Records requested pauses without sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pauses: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.pauses.borrow().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

/// Markers kept in memory. A key registered with [`hold_for_polls`] reads
/// as set for that many probes, then clears itself, like a lock released
/// by another process.
///
/// [`hold_for_polls`]: MemoryStateStore::hold_for_polls
#[derive(Default)]
pub struct MemoryStateStore {
    markers: RefCell<BTreeMap<String, SystemTime>>,
    held: RefCell<BTreeMap<String, usize>>,
    probes: RefCell<BTreeMap<String, usize>>,
}

impl MemoryStateStore {
    pub fn hold_for_polls(&self, key: &str, polls: usize) {
        self.held.borrow_mut().insert(key.to_string(), polls);
    }

    /// How many times `key` was read.
    pub fn probes(&self, key: &str) -> usize {
        self.probes.borrow().get(key).copied().unwrap_or(0)
    }
}

impl StateStore for MemoryStateStore {
    fn set(&self, key: &str) -> Result<()> {
        self.markers
            .borrow_mut()
            .insert(key.to_string(), SystemTime::now());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.markers.borrow_mut().remove(key);
        Ok(())
    }

    fn set_since(&self, key: &str) -> Result<Option<SystemTime>> {
        *self.probes.borrow_mut().entry(key.to_string()).or_insert(0) += 1;
        if let Some(remaining) = self.held.borrow_mut().get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Some(SystemTime::now()));
            }
        }
        Ok(self.markers.borrow().get(key).copied())
    }
}

/// Backend kept in memory. Every call is recorded as a short line such as
/// `create crowbar/default` or `transition installed`.
#[derive(Default)]
pub struct FakeBackend {
    proposals: RefCell<Vec<String>>,
    create_failures: Cell<u32>,
    commit_failure: RefCell<Option<String>>,
    show_failure: RefCell<Option<String>>,
    failing_transition: Cell<Option<LifecycleState>>,
    node_state: Cell<Option<LifecycleState>>,
    calls: RefCell<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proposal(self, name: &str) -> Self {
        self.proposals.borrow_mut().push(name.to_string());
        self
    }

    /// Fail the next `count` proposal creations.
    pub fn fail_creates(self, count: u32) -> Self {
        self.create_failures.set(count);
        self
    }

    pub fn fail_commit(self, detail: &str) -> Self {
        *self.commit_failure.borrow_mut() = Some(detail.to_string());
        self
    }

    pub fn fail_show(self, detail: &str) -> Self {
        *self.show_failure.borrow_mut() = Some(detail.to_string());
        self
    }

    pub fn fail_transition(self, state: LifecycleState) -> Self {
        self.failing_transition.set(Some(state));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// States transitioned to, in order.
    pub fn transitions(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| call.strip_prefix("transition "))
            .map(str::to_string)
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

fn fake_error(command: &str, detail: &str) -> BackendError {
    BackendError {
        command: command.to_string(),
        detail: detail.to_string(),
    }
}

impl Backend for FakeBackend {
    fn list_proposals(&self, barclamp: &str) -> BackendResult<Vec<String>> {
        self.record(format!("list {barclamp}"));
        Ok(self.proposals.borrow().clone())
    }

    fn create_proposal(&self, barclamp: &str, name: &str, _attributes: &Path) -> BackendResult<()> {
        self.record(format!("create {barclamp}/{name}"));
        let remaining = self.create_failures.get();
        if remaining > 0 {
            self.create_failures.set(remaining - 1);
            return Err(fake_error("create", "search index not ready"));
        }
        self.proposals.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn show_proposal(&self, barclamp: &str, name: &str) -> BackendResult<ProposalDocument> {
        self.record(format!("show {barclamp}/{name}"));
        if let Some(detail) = self.show_failure.borrow().as_deref() {
            return Err(fake_error("show", detail));
        }
        Ok(json!({
            "id": format!("bc-{barclamp}-{name}"),
            "deployment": { barclamp: { "elements": { barclamp: ["admin.cloud.test"] } } }
        }))
    }

    fn commit_proposal(&self, barclamp: &str, name: &str) -> BackendResult<()> {
        self.record(format!("commit {barclamp}/{name}"));
        match self.commit_failure.borrow().as_deref() {
            Some(detail) => Err(fake_error("commit", detail)),
            None => Ok(()),
        }
    }

    fn show_resource(&self, barclamp: &str, name: &str) -> BackendResult<Value> {
        self.record(format!("show {barclamp}/{name}"));
        Ok(json!({ "id": format!("{barclamp}-{name}") }))
    }

    fn show_node(&self, fqdn: &str) -> BackendResult<Value> {
        self.record(format!("node {fqdn}"));
        Ok(json!({
            "name": fqdn,
            "state": self.node_state.get().map(LifecycleState::as_str),
        }))
    }

    fn transition(&self, _fqdn: &str, state: LifecycleState) -> BackendResult<()> {
        self.record(format!("transition {state}"));
        if self.failing_transition.get() == Some(state) {
            return Err(fake_error("transition", "node not found in search index"));
        }
        self.node_state.set(Some(state));
        Ok(())
    }

    fn run_client(&self) -> BackendResult<()> {
        self.record("client".to_string());
        Ok(())
    }
}

/// Node matching [`script_healthy_host`] defaults.
pub fn admin_node() -> crate::node::Node {
    crate::node::Node {
        fqdn: "admin.cloud.test".to_string(),
        domain: "cloud.test".to_string(),
        addresses: vec!["192.168.124.10".parse().expect("address")],
        admin_address: "192.168.124.10".parse().expect("address"),
    }
}

/// Script the host probes of a healthy admin node that uses the default
/// command templates: resolvable FQDN on a local interface, open firewall.
pub fn script_healthy_host(runner: &ScriptedRunner, fqdn: &str, address: &str) {
    let domain = fqdn.split_once('.').map(|(_, domain)| domain).unwrap_or(fqdn);
    runner
        .on("hostname -f", CommandOutput::ok(format!("{fqdn}\n")))
        .on("dnsdomainname", CommandOutput::ok(format!("{domain}\n")))
        .on(
            &format!("getent ahosts {fqdn}"),
            CommandOutput::ok(format!(
                "{address}      STREAM {fqdn}\n{address}      DGRAM\n{address}      RAW\n"
            )),
        )
        .on(
            "ip -o addr show",
            CommandOutput::ok(format!(
                "1: lo    inet 127.0.0.1/8 scope host lo\n\
                 2: eth0    inet {address}/24 brd 192.168.124.255 scope global eth0\n"
            )),
        )
        .on(
            "iptables -S",
            CommandOutput::ok("-P INPUT ACCEPT\n-P FORWARD ACCEPT\n-P OUTPUT ACCEPT\n"),
        );
}

/// Write a shadow file whose root entry carries a usable password hash.
pub fn write_unlocked_shadow(path: &std::path::Path) {
    std::fs::write(
        path,
        "root:$6$salt$hash:19000:0:99999:7:::\nnobody:*:19000::::::\n",
    )
    .expect("write shadow");
}
