//! Initialization helpers for `.taskrouter/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{RouterConfig, write_config};

/// Canonical paths for a project root.
#[derive(Debug, Clone)]
pub struct RouterPaths {
    pub root: PathBuf,
    pub router_dir: PathBuf,
    pub config_path: PathBuf,
}

impl RouterPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let router_dir = root.join(".taskrouter");
        Self {
            root: root.clone(),
            router_dir: router_dir.clone(),
            config_path: router_dir.join("config.toml"),
        }
    }

    /// Resolve the configured log directory against the project root.
    pub fn log_dir(&self, cfg: &RouterConfig) -> PathBuf {
        if cfg.log_dir.is_absolute() {
            cfg.log_dir.clone()
        } else {
            self.root.join(&cfg.log_dir)
        }
    }
}

/// Options for `init_router`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config.
    pub force: bool,
}

/// Create `.taskrouter/config.toml` and the default log directory in `root`.
///
/// Fails if the config already exists unless `options.force` is set.
pub fn init_router(root: &Path, options: &InitOptions) -> Result<RouterPaths> {
    let paths = RouterPaths::new(root);
    if paths.router_dir.exists() && !paths.router_dir.is_dir() {
        return Err(anyhow!(
            "taskrouter init: .taskrouter exists but is not a directory"
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "taskrouter init: config already exists (use --force to overwrite)"
        ));
    }

    let cfg = RouterConfig::default();
    write_config(&paths.config_path, &cfg)?;
    let log_dir = paths.log_dir(&cfg);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("create directory {}", log_dir.display()))?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_config_and_log_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_router(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.config_path.is_file());
        assert!(temp.path().join("docs").is_dir());
        assert_eq!(
            load_config(&paths.config_path).expect("load"),
            RouterConfig::default()
        );
    }

    #[test]
    fn init_without_force_refuses_existing_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_router(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_router(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_restores_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_router(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "max_steps_default = 2\n").expect("write custom");

        init_router(temp.path(), &InitOptions { force: true }).expect("re-init");
        let cfg = load_config(&paths.config_path).expect("load");
        assert_eq!(cfg.max_steps_default, 10);
    }

    #[test]
    fn absolute_log_dir_is_kept() {
        let paths = RouterPaths::new("/project");
        let cfg = RouterConfig {
            log_dir: PathBuf::from("/var/log/router"),
            ..RouterConfig::default()
        };
        assert_eq!(paths.log_dir(&cfg), PathBuf::from("/var/log/router"));
        assert_eq!(
            paths.log_dir(&RouterConfig::default()),
            PathBuf::from("/project/docs")
        );
    }
}
