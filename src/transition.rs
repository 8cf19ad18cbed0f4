//! Lifecycle walk of the admin node.
//!
//! The node moves through a fixed sequence of states, each issued to the
//! backend and followed by one convergence run. Nothing is resumed across
//! runs: a fresh run walks every state from the top and relies on each
//! transition being idempotent on the backend side.
use crate::backend::Backend;
use crate::error::{BootstrapError, Result};
use crate::node::Node;
use crate::retry::Sleeper;
use crate::store::StateStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Discovering,
    Discovered,
    HardwareInstalling,
    HardwareInstalled,
    Installing,
    Installed,
    Readying,
    Ready,
}

impl LifecycleState {
    /// Every state in walk order.
    pub const ALL: [LifecycleState; 8] = [
        LifecycleState::Discovering,
        LifecycleState::Discovered,
        LifecycleState::HardwareInstalling,
        LifecycleState::HardwareInstalled,
        LifecycleState::Installing,
        LifecycleState::Installed,
        LifecycleState::Readying,
        LifecycleState::Ready,
    ];

    /// Name understood by `crowbar machines transition`.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Discovering => "discovering",
            LifecycleState::Discovered => "discovered",
            LifecycleState::HardwareInstalling => "hardware-installing",
            LifecycleState::HardwareInstalled => "hardware-installed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Readying => "readying",
            LifecycleState::Ready => "ready",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Ready
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra verification after a state is reached. `Err` carries the reason.
pub type TransitionHook<'a> = Box<dyn Fn(&Node) -> std::result::Result<(), String> + 'a>;

/// Explicit state -> hook mapping; states without an entry have no hook.
#[derive(Default)]
pub struct TransitionHooks<'a> {
    hooks: BTreeMap<LifecycleState, TransitionHook<'a>>,
}

impl<'a> TransitionHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `state`, replacing any earlier one.
    pub fn register(
        &mut self,
        state: LifecycleState,
        hook: impl Fn(&Node) -> std::result::Result<(), String> + 'a,
    ) -> &mut Self {
        self.hooks.insert(state, Box::new(hook));
        self
    }

    pub fn get(&self, state: LifecycleState) -> Option<&TransitionHook<'a>> {
        self.hooks.get(&state)
    }

    pub fn states(&self) -> Vec<LifecycleState> {
        self.hooks.keys().copied().collect()
    }
}

pub struct TransitionStateMachine<'a> {
    backend: &'a dyn Backend,
    store: &'a dyn StateStore,
    sleeper: &'a dyn Sleeper,
    busy_lock: String,
    poll_interval: Duration,
    hooks: TransitionHooks<'a>,
}

impl<'a> TransitionStateMachine<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        store: &'a dyn StateStore,
        sleeper: &'a dyn Sleeper,
        busy_lock: &str,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            sleeper,
            busy_lock: busy_lock.to_string(),
            poll_interval,
            hooks: TransitionHooks::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: TransitionHooks<'a>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Walk every state in order. Returns the states reached.
    pub fn run(&self, node: &Node) -> Result<Vec<LifecycleState>> {
        let mut reached = Vec::with_capacity(LifecycleState::ALL.len());
        for state in LifecycleState::ALL {
            let start = Instant::now();
            self.wait_until_idle(state)?;
            self.advance(node, state)?;
            reached.push(state);
            tracing::info!(
                state = %state,
                elapsed_ms = start.elapsed().as_millis(),
                "state reached"
            );
        }
        Ok(reached)
    }

    fn advance(&self, node: &Node, state: LifecycleState) -> Result<()> {
        let failed = |detail: String| BootstrapError::Transition { state, detail };

        self.backend
            .transition(&node.fqdn, state)
            .map_err(|err| failed(err.to_string()))?;
        if let Some(hook) = self.hooks.get(state) {
            hook(node).map_err(|reason| failed(format!("verification hook: {reason}")))?;
        }
        self.backend
            .run_client()
            .map_err(|err| failed(err.to_string()))
    }

    /// Block while the periodic client holds its busy lock.
    fn wait_until_idle(&self, state: LifecycleState) -> Result<()> {
        let mut polls = 0u32;
        while self.store.is_set(&self.busy_lock)? {
            if polls == 0 {
                tracing::info!(state = %state, lock = %self.busy_lock, "waiting for running client");
            }
            polls += 1;
            self.sleeper.sleep(self.poll_interval);
        }
        if polls > 0 {
            tracing::debug!(state = %state, polls, "client finished");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "transition_tests.rs"]
mod tests;
