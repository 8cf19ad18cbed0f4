//! Deployment gate.
//!
//! While the gate is held, the periodic client-trigger on the admin node
//! does nothing. The install run acquires it before touching proposals and
//! releases it only after the lifecycle walk reaches `ready`; a failed run
//! leaves it held so a re-run after the fix is still protected.
use crate::error::Result;
use crate::paths::GATE_KEY;
use crate::store::StateStore;
use std::time::{Duration, SystemTime};

pub struct DeploymentGate<'a> {
    store: &'a dyn StateStore,
    key: String,
}

impl<'a> DeploymentGate<'a> {
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self::with_key(store, GATE_KEY)
    }

    pub fn with_key(store: &'a dyn StateStore, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    pub fn acquire(&self) -> Result<()> {
        if let Some(age) = self.held_for()? {
            tracing::warn!(
                held_secs = age.as_secs(),
                "deployment gate already held, likely left by an earlier failed run"
            );
        }
        self.store.set(&self.key)?;
        tracing::info!(key = %self.key, "deployment gate acquired");
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        self.store.clear(&self.key)?;
        tracing::info!(key = %self.key, "deployment gate released");
        Ok(())
    }

    pub fn is_held(&self) -> Result<bool> {
        self.store.is_set(&self.key)
    }

    /// How long the gate has been held, `None` when it is open.
    pub fn held_for(&self) -> Result<Option<Duration>> {
        let since = self.store.set_since(&self.key)?;
        Ok(since.map(|since| {
            SystemTime::now()
                .duration_since(since)
                .unwrap_or_default()
        }))
    }
}
