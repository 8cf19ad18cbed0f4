//! Package repository validation.
//!
//! Repositories are read, never changed, with one exception: a skip-listed
//! repository whose metadata is missing or lacks its product gets an empty
//! but structurally valid repository generated in its place, so downstream
//! tooling sees a repository instead of a hole.
use crate::config::{InstallMode, RepositoryConfig};
use crate::error::{BootstrapError, Result};
use crate::exec::{command_line, CommandRunner};
use anyhow::Context;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PRODUCT_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<summary(?:\s[^>]*)?>\s*(.*?)\s*</summary>").expect("summary regex")
});

/// How a repository check concluded without failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoOutcome {
    Verified,
    /// Skip-listed; nothing was inspected.
    Skipped,
    /// Skip-listed and incomplete; empty metadata was generated.
    Synthesized,
}

pub struct RepositoryValidator<'a> {
    runner: &'a dyn CommandRunner,
    mode: InstallMode,
    skip: BTreeSet<String>,
    createrepo: String,
}

impl<'a> RepositoryValidator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        mode: InstallMode,
        skip: BTreeSet<String>,
        createrepo: &str,
    ) -> Self {
        Self {
            runner,
            mode,
            skip,
            createrepo: createrepo.to_string(),
        }
    }

    pub fn is_skipped(&self, repo: &RepositoryConfig) -> bool {
        self.skip.contains(&repo.name)
    }

    /// Check setup and content of every repository, then its product.
    pub fn validate_all<'r>(
        &self,
        repos: impl IntoIterator<Item = &'r RepositoryConfig>,
    ) -> Result<Vec<(String, RepoOutcome)>> {
        let mut outcomes = Vec::new();
        for repo in repos {
            self.check_content(repo)?;
            let outcome = self.check_product(repo)?;
            tracing::info!(repo = %repo.name, ?outcome, "repository checked");
            outcomes.push((repo.name.clone(), outcome));
        }
        Ok(outcomes)
    }

    pub fn check_content(&self, repo: &RepositoryConfig) -> Result<RepoOutcome> {
        if self.is_skipped(repo) {
            return Ok(RepoOutcome::Skipped);
        }
        let marker = setup_marker(&repo.path);
        if !marker.is_file() {
            return Err(BootstrapError::NotSetUp {
                repo: repo.name.clone(),
                marker,
            });
        }
        if self.mode == InstallMode::Development {
            tracing::debug!(repo = %repo.name, "checksum comparison bypassed in development mode");
            return Ok(RepoOutcome::Verified);
        }
        let Some(expected) = repo.checksum.as_deref() else {
            return Ok(RepoOutcome::Verified);
        };
        let manifest = repo.path.join("content");
        let bytes = fs::read(&manifest)
            .with_context(|| format!("read repository manifest {}", manifest.display()))?;
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(BootstrapError::ContentMismatch {
                repo: repo.name.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(RepoOutcome::Verified)
    }

    pub fn check_product(&self, repo: &RepositoryConfig) -> Result<RepoOutcome> {
        let found = if setup_marker(&repo.path).is_file() {
            match product_summaries(&repo.path) {
                Ok(found) => found,
                Err(err) if self.is_skipped(repo) => {
                    tracing::debug!(repo = %repo.name, error = %err, "unreadable product metadata");
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };
        let satisfied = match (&found, repo.product.as_deref()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(summaries), Some(expected)) => summaries.iter().any(|s| s == expected),
        };
        if satisfied {
            return Ok(RepoOutcome::Verified);
        }
        if self.is_skipped(repo) {
            self.synthesize(repo)?;
            return Ok(RepoOutcome::Synthesized);
        }
        match repo.product.as_deref() {
            Some(expected) => Err(BootstrapError::ProductMismatch {
                repo: repo.name.clone(),
                expected: expected.to_string(),
                found: found.unwrap_or_default(),
            }),
            None => Err(BootstrapError::NotSetUp {
                repo: repo.name.clone(),
                marker: setup_marker(&repo.path),
            }),
        }
    }

    fn synthesize(&self, repo: &RepositoryConfig) -> Result<()> {
        tracing::warn!(
            repo = %repo.name,
            path = %repo.path.display(),
            "repository incomplete but skip-listed; generating empty metadata"
        );
        fs::create_dir_all(&repo.path)
            .with_context(|| format!("create {}", repo.path.display()))?;
        let path = repo.path.to_string_lossy().to_string();
        let argv = command_line(&self.createrepo, [path])?;
        let output = self.runner.run(&argv)?;
        if !output.success() {
            return Err(anyhow::anyhow!(
                "createrepo for {} failed: {}",
                repo.name,
                output.detail()
            )
            .into());
        }
        Ok(())
    }
}

fn setup_marker(repo_path: &Path) -> PathBuf {
    repo_path.join("repodata").join("repomd.xml")
}

/// Summaries from the first `repodata/*products.xml`, `None` when the
/// repository has no product metadata.
fn product_summaries(repo_path: &Path) -> Result<Option<Vec<String>>> {
    let repodata = repo_path.join("repodata");
    let mut candidates: Vec<PathBuf> = fs::read_dir(&repodata)
        .with_context(|| format!("read {}", repodata.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with("products.xml"))
        })
        .collect();
    candidates.sort();
    let Some(path) = candidates.first() else {
        return Ok(None);
    };
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let summaries = PRODUCT_SUMMARY
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1))
        .map(|summary| summary.as_str().to_string())
        .collect();
    Ok(Some(summaries))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "repos_tests.rs"]
mod tests;
