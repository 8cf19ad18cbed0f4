//! Ordered installation of installable units (barclamps).
//!
//! Units depend on the ones before them, so installation is strictly
//! sequential and stops at the first failure. A unit whose descriptor
//! marker exists is skipped without re-verification; units already
//! installed are never rolled back.
use crate::config::InstallMode;
use crate::error::{BootstrapError, Result};
use crate::exec::{command_line, CommandRunner};
use crate::paths::HostPaths;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallableUnit {
    pub name: String,
    /// Zero-based position in the install order.
    pub position: usize,
}

/// Number the configured unit names in install order.
pub fn ordered_units(names: &[String]) -> Vec<InstallableUnit> {
    names
        .iter()
        .enumerate()
        .map(|(position, name)| InstallableUnit {
            name: name.clone(),
            position,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub mode: InstallMode,
    /// Root of the unit source checkouts, used in development mode.
    pub source_tree: PathBuf,
    pub install_command: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct UnitInstaller<'a> {
    runner: &'a dyn CommandRunner,
    paths: &'a HostPaths,
    options: InstallOptions,
}

impl<'a> UnitInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a HostPaths, options: InstallOptions) -> Self {
        Self {
            runner,
            paths,
            options,
        }
    }

    pub fn is_installed(&self, unit: &str) -> bool {
        self.paths.unit_marker(unit).is_file()
    }

    /// Install `framework` unconditionally, then each unit in order.
    pub fn install_all(&self, framework: &str, units: &[InstallableUnit]) -> Result<InstallReport> {
        let mut report = InstallReport::default();
        self.install(framework)?;
        report.installed.push(framework.to_string());

        let mut ordered = units.to_vec();
        ordered.sort_by_key(|unit| unit.position);
        for unit in &ordered {
            if self.is_installed(&unit.name) {
                tracing::debug!(unit = %unit.name, "unit already installed");
                report.skipped.push(unit.name.clone());
                continue;
            }
            self.install(&unit.name)?;
            report.installed.push(unit.name.clone());
        }
        Ok(report)
    }

    fn install(&self, unit: &str) -> Result<()> {
        let target = match self.options.mode {
            InstallMode::Production => vec!["--rpm".to_string(), unit.to_string()],
            InstallMode::Development => vec![self
                .options
                .source_tree
                .join(unit)
                .to_string_lossy()
                .to_string()],
        };
        let argv = command_line(&self.options.install_command, target)?;
        let start = Instant::now();
        let output = self.runner.run(&argv)?;
        let elapsed_ms = start.elapsed().as_millis();
        if !output.success() {
            return Err(BootstrapError::Install {
                unit: unit.to_string(),
                detail: output.detail(),
            });
        }
        tracing::info!(unit, elapsed_ms, "unit installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::testing::ScriptedRunner;

    fn options(mode: InstallMode) -> InstallOptions {
        InstallOptions {
            mode,
            source_tree: PathBuf::from("/src/barclamps"),
            install_command: "barclamp_install.rb".to_string(),
        }
    }

    fn units(names: &[&str]) -> Vec<InstallableUnit> {
        ordered_units(&names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn marked_units_are_skipped_and_the_rest_installed_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = HostPaths::new(dir.path().join("state"), dir.path().join("barclamps"));
        std::fs::create_dir_all(dir.path().join("barclamps")).expect("mkdir");
        std::fs::write(paths.unit_marker("dns"), "barclamp: dns\n").expect("marker");
        std::fs::write(paths.unit_marker("crowbar"), "barclamp: crowbar\n").expect("marker");

        let runner = ScriptedRunner::new();
        let installer = UnitInstaller::new(&runner, &paths, options(InstallMode::Production));
        let report = installer
            .install_all("crowbar", &units(&["deployer", "dns", "network"]))
            .expect("install");

        assert_eq!(
            runner.calls(),
            vec![
                "barclamp_install.rb --rpm crowbar",
                "barclamp_install.rb --rpm deployer",
                "barclamp_install.rb --rpm network",
            ]
        );
        assert_eq!(report.installed, vec!["crowbar", "deployer", "network"]);
        assert_eq!(report.skipped, vec!["dns"]);
    }

    #[test]
    fn failure_stops_the_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = HostPaths::new(dir.path().join("state"), dir.path().join("barclamps"));
        let runner = ScriptedRunner::new();
        runner.on(
            "barclamp_install.rb --rpm dns",
            CommandOutput::failed(1, "missing dependency deployer"),
        );
        let installer = UnitInstaller::new(&runner, &paths, options(InstallMode::Production));

        let err = installer
            .install_all("crowbar", &units(&["deployer", "dns", "network"]))
            .expect_err("dns fails");
        match err {
            BootstrapError::Install { unit, detail } => {
                assert_eq!(unit, "dns");
                assert_eq!(detail, "missing dependency deployer");
            }
            other => panic!("unexpected {other}"),
        }
        assert!(runner
            .calls()
            .iter()
            .all(|call| !call.ends_with("network")));
    }

    #[test]
    fn development_mode_installs_from_source_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = HostPaths::new(dir.path().join("state"), dir.path().join("barclamps"));
        let runner = ScriptedRunner::new();
        let installer = UnitInstaller::new(&runner, &paths, options(InstallMode::Development));

        installer
            .install_all("crowbar", &units(&["nova"]))
            .expect("install");
        assert_eq!(
            runner.calls(),
            vec![
                "barclamp_install.rb /src/barclamps/crowbar",
                "barclamp_install.rb /src/barclamps/nova",
            ]
        );
    }
}
