//! Proposal negotiation with the backend.
//!
//! Creation fails routinely while the backend's search index lags behind,
//! so it is retried with a client run between attempts. Commit failures
//! point at a structural problem (a missing dependency barclamp, say) and
//! are reported on the first failure.
use crate::backend::{Backend, ProposalDocument};
use crate::error::{BootstrapError, Result};
use crate::retry::{retry, RetryPolicy, Sleeper};
use anyhow::Context;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalCreation {
    Created { attempts: u32 },
    AlreadyExists,
}

pub struct ProposalManager<'a> {
    backend: &'a dyn Backend,
    sleeper: &'a dyn Sleeper,
    barclamp: String,
    policy: RetryPolicy,
}

impl<'a> ProposalManager<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        sleeper: &'a dyn Sleeper,
        barclamp: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            sleeper,
            barclamp: barclamp.to_string(),
            policy,
        }
    }

    pub fn ensure_created(&self, name: &str, attributes: &Path) -> Result<ProposalCreation> {
        let existing = self.backend.list_proposals(&self.barclamp)?;
        if existing.iter().any(|proposal| proposal == name) {
            tracing::info!(barclamp = %self.barclamp, proposal = name, "proposal already exists");
            return Ok(ProposalCreation::AlreadyExists);
        }
        check_attributes(attributes)?;

        let created = retry(
            &self.policy,
            self.sleeper,
            |attempt| {
                tracing::debug!(proposal = name, attempt, "creating proposal");
                self.backend
                    .create_proposal(&self.barclamp, name, attributes)
                    .map(|()| attempt)
            },
            |attempt, err| {
                tracing::warn!(proposal = name, attempt, error = %err, "proposal creation failed; running client before retry");
                if let Err(kick) = self.backend.run_client() {
                    tracing::warn!(error = %kick, "client run between attempts failed");
                }
            },
        );
        match created {
            Ok(attempts) => {
                tracing::info!(barclamp = %self.barclamp, proposal = name, attempts, "proposal created");
                Ok(ProposalCreation::Created { attempts })
            }
            Err(exhausted) => Err(BootstrapError::ProposalCreate {
                proposal: name.to_string(),
                attempts: exhausted.attempts,
                detail: exhausted.last.detail,
            }),
        }
    }

    pub fn commit(&self, name: &str) -> Result<()> {
        self.backend
            .commit_proposal(&self.barclamp, name)
            .map_err(|err| BootstrapError::ProposalCommit {
                proposal: name.to_string(),
                detail: err.detail,
            })?;
        tracing::info!(barclamp = %self.barclamp, proposal = name, "proposal committed");
        Ok(())
    }

    pub fn show(&self, name: &str) -> Result<ProposalDocument> {
        Ok(self.backend.show_proposal(&self.barclamp, name)?)
    }
}

/// The attributes file must exist and hold a JSON object.
fn check_attributes(path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read proposal attributes {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parse proposal attributes {}", path.display()))?;
    if !value.is_object() {
        return Err(BootstrapError::Config(format!(
            "proposal attributes {} must be a JSON object",
            path.display()
        )));
    }
    Ok(())
}

/// Whether `fqdn` is listed under any role in the proposal's deployment
/// elements.
pub fn proposal_lists_node(document: &ProposalDocument, fqdn: &str) -> bool {
    let Some(deployment) = document.get("deployment").and_then(|d| d.as_object()) else {
        return false;
    };
    deployment
        .values()
        .filter_map(|section| section.get("elements").and_then(|e| e.as_object()))
        .flat_map(|elements| elements.values())
        .filter_map(|members| members.as_array())
        .flatten()
        .any(|member| member.as_str() == Some(fqdn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, RecordingSleeper};
    use serde_json::json;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            backoff: Duration::from_secs(10),
        }
    }

    fn attributes(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("crowbar.json");
        fs::write(&path, r#"{"attributes":{"crowbar":{}}}"#).expect("write attributes");
        path
    }

    #[test]
    fn existing_proposal_short_circuits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FakeBackend::new().with_proposal("default");
        let sleeper = RecordingSleeper::default();
        let manager = ProposalManager::new(&backend, &sleeper, "crowbar", policy());

        let outcome = manager
            .ensure_created("default", &attributes(dir.path()))
            .expect("ensure");
        assert_eq!(outcome, ProposalCreation::AlreadyExists);
        assert_eq!(backend.calls(), vec!["list crowbar"]);
    }

    #[test]
    fn transient_failures_kick_the_client_once_each() {
        let dir = tempfile::tempdir().expect("tempdir");
        for failures in 0..5u32 {
            let backend = FakeBackend::new().fail_creates(failures);
            let sleeper = RecordingSleeper::default();
            let manager = ProposalManager::new(&backend, &sleeper, "crowbar", policy());

            let outcome = manager
                .ensure_created("default", &attributes(dir.path()))
                .expect("eventually created");
            assert_eq!(
                outcome,
                ProposalCreation::Created {
                    attempts: failures + 1
                }
            );
            assert_eq!(backend.count("client"), failures as usize);
            assert_eq!(sleeper.total(), Duration::from_secs(10) * failures);
        }
    }

    #[test]
    fn exhausted_creation_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FakeBackend::new().fail_creates(5);
        let sleeper = RecordingSleeper::default();
        let manager = ProposalManager::new(&backend, &sleeper, "crowbar", policy());

        let err = manager
            .ensure_created("default", &attributes(dir.path()))
            .expect_err("five failures");
        match err {
            BootstrapError::ProposalCreate {
                proposal, attempts, ..
            } => {
                assert_eq!(proposal, "default");
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(backend.count("create"), 5);
        assert_eq!(backend.count("client"), 4);
        assert_eq!(backend.count("commit"), 0);
    }

    #[test]
    fn commit_is_attempted_once() {
        let backend = FakeBackend::new().fail_commit("dependency dns is not active");
        let sleeper = RecordingSleeper::default();
        let manager = ProposalManager::new(&backend, &sleeper, "crowbar", policy());

        let err = manager.commit("default").expect_err("commit fails");
        assert_eq!(err.kind(), "proposal_commit");
        assert!(err.to_string().contains("dependency dns"), "{err}");
        assert_eq!(backend.count("commit"), 1);
        assert!(sleeper.pauses().is_empty());
    }

    #[test]
    fn show_returns_the_backend_document() {
        let backend = FakeBackend::new();
        let sleeper = RecordingSleeper::default();
        let manager = ProposalManager::new(&backend, &sleeper, "crowbar", policy());

        let document = manager.show("default").expect("show");
        assert_eq!(document["id"], "bc-crowbar-default");
        assert!(proposal_lists_node(&document, "admin.cloud.test"));
        assert_eq!(backend.calls(), vec!["show crowbar/default"]);
    }

    #[test]
    fn show_failure_is_reported() {
        let backend = FakeBackend::new().fail_show("no proposal named default");
        let sleeper = RecordingSleeper::default();
        let manager = ProposalManager::new(&backend, &sleeper, "crowbar", policy());

        let err = manager.show("default").expect_err("show fails");
        assert!(err.to_string().contains("no proposal named default"), "{err}");
    }

    #[test]
    fn unreadable_attributes_stop_before_creation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("crowbar.json");
        fs::write(&path, "[1, 2]").expect("write");
        let backend = FakeBackend::new();
        let sleeper = RecordingSleeper::default();
        let manager = ProposalManager::new(&backend, &sleeper, "crowbar", policy());

        let err = manager.ensure_created("default", &path).expect_err("array");
        assert_eq!(err.kind(), "config");
        assert!(manager
            .ensure_created("default", &dir.path().join("missing.json"))
            .is_err());
        assert_eq!(backend.count("create"), 0);
    }

    #[test]
    fn node_membership_is_read_from_deployment_elements() {
        let document = json!({
            "deployment": {
                "crowbar": {
                    "elements": { "crowbar": ["admin.cloud.test"] }
                }
            }
        });
        assert!(proposal_lists_node(&document, "admin.cloud.test"));
        assert!(!proposal_lists_node(&document, "other.cloud.test"));
        assert!(!proposal_lists_node(&json!({}), "admin.cloud.test"));
    }
}
