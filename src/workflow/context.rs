use crate::config::{load_config, validate_config, BootstrapConfig, InstallMode};
use crate::error::Result;
use crate::paths::HostPaths;
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub mode: Option<InstallMode>,
    pub proposal_attributes: Option<PathBuf>,
    pub source_tree: Option<PathBuf>,
    pub skip_repos: Vec<String>,
    pub state_root: Option<PathBuf>,
    pub verify_web_ui: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut BootstrapConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(path) = self.proposal_attributes {
            config.proposal_attributes = path;
        }
        if let Some(path) = self.source_tree {
            config.source_tree = path;
        }
        for repo in self.skip_repos {
            if !config.skip_repos.contains(&repo) {
                config.skip_repos.push(repo);
            }
        }
        if let Some(root) = self.state_root {
            config.state_root = root;
        }
        if let Some(verify) = self.verify_web_ui {
            config.verify_web_ui = verify;
        }
    }
}

/// Validated configuration plus the host paths derived from it.
pub struct RunContext {
    pub config: BootstrapConfig,
    pub paths: HostPaths,
}

impl RunContext {
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = load_config(config_path)?;
        overrides.apply(&mut config);
        validate_config(&config)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: BootstrapConfig) -> Self {
        let paths = HostPaths::new(config.state_root.clone(), config.barclamp_dir.clone());
        Self { config, paths }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_and_skip_repos_accumulate() {
        let mut config = BootstrapConfig {
            skip_repos: vec!["Extra-Repo".to_string()],
            ..BootstrapConfig::default()
        };
        ConfigOverrides {
            mode: Some(InstallMode::Development),
            state_root: Some(PathBuf::from("/tmp/state")),
            skip_repos: vec!["Extra-Repo".to_string(), "SLE-HA".to_string()],
            verify_web_ui: Some(false),
            ..ConfigOverrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.mode, InstallMode::Development);
        assert_eq!(config.state_root, PathBuf::from("/tmp/state"));
        assert_eq!(config.skip_repos, vec!["Extra-Repo", "SLE-HA"]);
        assert!(!config.verify_web_ui);
        assert!(config.skip_set().contains("Cloud-PTF"));
    }

    #[test]
    fn load_validates_the_merged_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bootstrap.json");
        std::fs::write(&path, r#"{"schema_version": 7}"#).expect("write");

        let err = RunContext::load(Some(&path), ConfigOverrides::default())
            .err()
            .expect("bad schema");
        assert_eq!(err.kind(), "config");

        std::fs::write(&path, "{}").expect("write");
        let ctx = RunContext::load(
            Some(&path),
            ConfigOverrides {
                state_root: Some(dir.path().to_path_buf()),
                ..ConfigOverrides::default()
            },
        )
        .expect("load");
        assert_eq!(ctx.paths.state_root(), dir.path());
    }
}
