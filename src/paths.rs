//! Typed paths into the admin node's persisted state.
//!
//! Centralizing path construction keeps the install run, `status`, and
//! `gate` commands looking at the same markers.
use std::path::{Path, PathBuf};

/// Store key for the deployment gate, relative to the state root.
pub const GATE_KEY: &str = "install/disable_chef";
/// Store key for the installation success marker.
pub const SUCCESS_KEY: &str = "install/crowbar-installed-ok";

#[derive(Debug, Clone)]
pub struct HostPaths {
    state_root: PathBuf,
    barclamp_dir: PathBuf,
}

impl HostPaths {
    pub fn new(state_root: PathBuf, barclamp_dir: PathBuf) -> Self {
        Self {
            state_root,
            barclamp_dir,
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    /// Return the `install/` directory path.
    pub fn install_dir(&self) -> PathBuf {
        self.state_root.join("install")
    }

    /// Return the installation success marker path.
    pub fn success_marker(&self) -> PathBuf {
        self.state_root.join(SUCCESS_KEY)
    }

    /// Return the deployment gate marker path.
    pub fn gate_marker(&self) -> PathBuf {
        self.state_root.join(GATE_KEY)
    }

    /// Return the `install/install.log` path.
    pub fn install_log(&self) -> PathBuf {
        self.install_dir().join("install.log")
    }

    /// Return the machine identity credential path.
    pub fn machine_key(&self) -> PathBuf {
        self.state_root.join("machine.key")
    }

    /// Return the installed marker for one unit.
    pub fn unit_marker(&self, unit: &str) -> PathBuf {
        self.barclamp_dir.join(format!("{unit}.yml"))
    }
}
