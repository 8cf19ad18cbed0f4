//! Machine identity credential used by the backend to authenticate the
//! admin node's own API calls. Generated once; never rewritten.
use crate::error::Result;
use crate::store::epoch_ms;
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::SystemTime;

pub const MACHINE_KEY_USER: &str = "machine-install";

/// Create the machine key at `path` unless it already exists.
///
/// Returns `true` when a new key was written.
pub fn ensure_machine_key(path: &Path, hostname: &str) -> Result<bool> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "machine key present");
        return Ok(false);
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let secret = derive_secret(hostname, SystemTime::now(), std::process::id());
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create key file in {}", parent.display()))?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))
        .context("restrict machine key permissions")?;
    writeln!(tmp, "{MACHINE_KEY_USER}:{secret}")
        .with_context(|| format!("write {}", path.display()))?;
    tmp.persist_noclobber(path)
        .with_context(|| format!("persist {}", path.display()))?;
    tracing::info!(path = %path.display(), "machine key created");
    Ok(true)
}

fn derive_secret(hostname: &str, now: SystemTime, pid: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(epoch_ms(now).to_le_bytes());
    hasher.update(pid.to_le_bytes());
    format!("{:x}", hasher.finalize())
}
