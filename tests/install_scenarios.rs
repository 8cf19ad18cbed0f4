mod common;

use admin_bootstrap::error::BootstrapError;
use admin_bootstrap::exec::CommandOutput;
use admin_bootstrap::repos::RepoOutcome;
use admin_bootstrap::testing::RecordingSleeper;
use admin_bootstrap::transition::LifecycleState;
use common::{client_kicks, scripted_runner, TestHost, ADDRESS, FQDN};
use std::time::Duration;

const STATES: usize = LifecycleState::ALL.len();

#[test]
fn fresh_host_installs_and_releases_the_gate() {
    let host = TestHost::new();
    let runner = scripted_runner(|_| {});
    let sleeper = RecordingSleeper::default();

    let summary = host.run(&runner, &sleeper).expect("install succeeds");

    assert_eq!(summary.node.fqdn, FQDN);
    assert_eq!(summary.access_url, format!("http://{ADDRESS}:3000"));
    assert_eq!(summary.states, LifecycleState::ALL.to_vec());
    assert!(summary.proposal_created);
    assert!(host.paths.success_marker().is_file());
    assert!(!host.paths.gate_marker().exists());
    assert!(host.paths.machine_key().is_file());

    assert_eq!(
        runner.calls_starting_with("/opt/dell/bin/barclamp_install.rb"),
        vec![
            "/opt/dell/bin/barclamp_install.rb --rpm crowbar",
            "/opt/dell/bin/barclamp_install.rb --rpm deployer",
            "/opt/dell/bin/barclamp_install.rb --rpm dns",
            "/opt/dell/bin/barclamp_install.rb --rpm network",
        ]
    );
    assert_eq!(
        runner.calls_starting_with("crowbar crowbar proposal commit"),
        vec!["crowbar crowbar proposal commit default"]
    );
    assert_eq!(client_kicks(&runner, STATES), 0);
    assert!(sleeper.pauses().is_empty());
}

#[test]
fn skip_listed_repository_without_metadata_is_synthesized() {
    let host = TestHost::new();
    let ptf = host.repo_path("Cloud-PTF");
    std::fs::remove_dir_all(&ptf).expect("remove Cloud-PTF");
    let runner = scripted_runner(|_| {});
    let sleeper = RecordingSleeper::default();

    let summary = host.run(&runner, &sleeper).expect("install succeeds");

    assert!(summary
        .repositories
        .contains(&("Cloud-PTF".to_string(), RepoOutcome::Synthesized)));
    assert!(ptf.is_dir());
    assert_eq!(
        runner.calls_starting_with("createrepo"),
        vec![format!("createrepo {}", ptf.display())]
    );
    assert!(host.paths.success_marker().is_file());
}

#[test]
fn proposal_creation_recovers_after_three_failures() {
    let host = TestHost::new();
    let runner = scripted_runner(|runner| {
        runner.on_sequence(
            "crowbar crowbar proposal create",
            vec![CommandOutput::failed(1, "Failed to talk to search index"); 3],
            CommandOutput::ok("Created default\n"),
        );
    });
    let sleeper = RecordingSleeper::default();

    let summary = host.run(&runner, &sleeper).expect("install succeeds");

    assert!(summary.proposal_created);
    assert_eq!(runner.calls_starting_with("crowbar crowbar proposal create").len(), 4);
    assert_eq!(client_kicks(&runner, STATES), 3);
    let backoffs = sleeper
        .pauses()
        .into_iter()
        .filter(|pause| *pause == Duration::from_secs(10))
        .count();
    assert_eq!(backoffs, 3);
    assert!(sleeper.total() >= Duration::from_secs(30));
}

#[test]
fn failed_transition_leaves_the_gate_held() {
    let host = TestHost::new();
    let runner = scripted_runner(|runner| {
        runner.on(
            &format!("crowbar machines transition {FQDN} installed"),
            CommandOutput::failed(1, "Node not found in search index"),
        );
    });
    let sleeper = RecordingSleeper::default();

    let err = host.run(&runner, &sleeper).expect_err("transition fails");

    match err {
        BootstrapError::Transition { state, detail } => {
            assert_eq!(state, LifecycleState::Installed);
            assert!(detail.contains("Node not found"), "{detail}");
        }
        other => panic!("unexpected {other}"),
    }
    assert!(runner
        .calls_starting_with(&format!("crowbar machines transition {FQDN} ready"))
        .is_empty());
    assert!(host.paths.gate_marker().is_file());
    assert!(!host.paths.success_marker().exists());
}

#[test]
fn exhausted_proposal_creation_never_commits() {
    let host = TestHost::new();
    let runner = scripted_runner(|runner| {
        runner.on(
            "crowbar crowbar proposal create",
            CommandOutput::failed(1, "Failed to talk to search index"),
        );
    });
    let sleeper = RecordingSleeper::default();

    let err = host.run(&runner, &sleeper).expect_err("creation fails");

    assert_eq!(err.kind(), "proposal_create");
    assert_eq!(runner.calls_starting_with("crowbar crowbar proposal create").len(), 5);
    assert_eq!(runner.calls_starting_with("chef-client").len(), 4);
    assert!(runner.calls_starting_with("crowbar crowbar proposal commit").is_empty());
    assert!(runner.calls_starting_with("crowbar machines transition").is_empty());
    assert!(host.paths.gate_marker().is_file());
}

#[test]
fn rerun_skips_installed_units_and_existing_proposal() {
    let host = TestHost::new();
    host.mark_installed("deployer");
    host.mark_installed("dns");
    let runner = scripted_runner(|runner| {
        runner.on("crowbar crowbar proposal list", CommandOutput::ok("default\n"));
    });
    let sleeper = RecordingSleeper::default();

    let summary = host.run(&runner, &sleeper).expect("install succeeds");

    assert_eq!(summary.units.installed, vec!["crowbar", "network"]);
    assert_eq!(summary.units.skipped, vec!["deployer", "dns"]);
    assert!(!summary.proposal_created);
    assert!(runner.calls_starting_with("crowbar crowbar proposal create").is_empty());
    assert!(runner.calls_starting_with("crowbar crowbar proposal commit").is_empty());
    assert_eq!(runner.calls_starting_with("crowbar machines transition").len(), STATES);
}

#[test]
fn content_mismatch_stops_before_any_install() {
    let mut host = TestHost::new();
    host.config.repositories[1].checksum = Some("0".repeat(64));
    let runner = scripted_runner(|_| {});
    let sleeper = RecordingSleeper::default();

    let err = host.run(&runner, &sleeper).expect_err("checksum mismatch");

    assert_eq!(err.kind(), "content_mismatch");
    assert!(runner.calls_starting_with("/opt/dell/bin/barclamp_install.rb").is_empty());
    assert!(!host.paths.gate_marker().exists());
}
