//! Router configuration stored under `.taskrouter/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::roster::{AgentProfile, AgentRoster};

/// Overrides the log directory.
pub const ENV_LOG_DIR: &str = "ROUTER_LOG_DIR";
/// Overrides `max_steps_default`.
pub const ENV_MAX_STEPS: &str = "ROUTER_MAX_STEPS";

/// Router configuration (TOML).
///
/// Missing fields default to the values the router ships with. Relative
/// `log_dir` paths are resolved against the project root by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouterConfig {
    /// Directory for the event journal and narrative logs.
    pub log_dir: PathBuf,

    /// Auto-loop step cap when a request does not set `max_steps`.
    pub max_steps_default: u32,

    /// Require workers to acknowledge their policy on the first response line.
    pub enforce_ack: bool,

    /// Wall-clock budget in seconds for each invoker or oracle call.
    pub invoke_timeout_secs: u64,

    /// Truncate collaborator output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub invoker: CommandConfig,

    /// Leave `command` empty to finish every auto-loop after the first step.
    pub oracle: CommandConfig,

    /// Extra agents, or overrides of the built-in roster by display name.
    pub agents: Vec<AgentEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandConfig {
    /// Program and leading arguments; the agent key is appended.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentEntry {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_title: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("docs"),
            max_steps_default: 10,
            enforce_ack: true,
            invoke_timeout_secs: 300,
            output_limit_bytes: 100_000,
            invoker: CommandConfig {
                command: vec!["claude".to_string(), "--agent".to_string()],
            },
            oracle: CommandConfig::default(),
            agents: Vec::new(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(anyhow!("log_dir must be non-empty"));
        }
        if self.max_steps_default == 0 {
            return Err(anyhow!("max_steps_default must be > 0"));
        }
        if self.invoke_timeout_secs == 0 {
            return Err(anyhow!("invoke_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.invoker.command.is_empty() || self.invoker.command[0].trim().is_empty() {
            return Err(anyhow!("invoker.command must be a non-empty array"));
        }
        if self
            .oracle
            .command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("oracle.command must start with a program"));
        }
        self.roster()?;
        Ok(())
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    /// Built-in roster with configured agents layered on top.
    pub fn roster(&self) -> Result<AgentRoster> {
        let mut roster = AgentRoster::default();
        for entry in &self.agents {
            let mut profile = match roster.by_display_name(entry.display_name.trim()) {
                Some(existing) => existing.clone(),
                None => AgentProfile::from_display_name(&entry.display_name),
            };
            if let Some(key) = &entry.key {
                profile.key = key.trim().to_string();
            }
            if let Some(policy) = &entry.policy_title {
                profile.policy_title = policy.trim().to_string();
            }
            roster
                .upsert(profile)
                .with_context(|| format!("agent '{}'", entry.display_name))?;
        }
        Ok(roster)
    }

    /// Apply `ROUTER_LOG_DIR` / `ROUTER_MAX_STEPS` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|dir| !dir.trim().is_empty()) {
            debug!(log_dir = %dir, "log dir overridden from environment");
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.max_steps_default = raw
                .trim()
                .parse()
                .with_context(|| format!("parse {ENV_MAX_STEPS}={raw}"))?;
        }
        self.validate()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RouterConfig::default()`.
pub fn load_config(path: &Path) -> Result<RouterConfig> {
    if !path.exists() {
        let cfg = RouterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RouterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config and apply overrides from the process environment.
pub fn load_config_with_env(path: &Path) -> Result<RouterConfig> {
    let mut cfg = load_config(path)?;
    cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RouterConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RouterConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = RouterConfig {
            agents: vec![AgentEntry {
                display_name: "DocsWriter".to_string(),
                key: None,
                policy_title: Some("Docs Policy".to_string()),
            }],
            ..RouterConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_steps_default = 4\nenforce_ack = false\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_steps_default, 4);
        assert!(!cfg.enforce_ack);
        assert_eq!(cfg.invoke_timeout_secs, 300);
    }

    #[test]
    fn zero_step_cap_is_invalid() {
        let cfg = RouterConfig {
            max_steps_default: 0,
            ..RouterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_log_dir_and_step_cap() {
        let mut cfg = RouterConfig::default();
        cfg.apply_env_overrides(|key| match key {
            ENV_LOG_DIR => Some("/var/log/router".to_string()),
            ENV_MAX_STEPS => Some("3".to_string()),
            _ => None,
        })
        .expect("overrides");
        assert_eq!(cfg.log_dir, PathBuf::from("/var/log/router"));
        assert_eq!(cfg.max_steps_default, 3);

        let err = cfg
            .apply_env_overrides(|key| (key == ENV_MAX_STEPS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_STEPS));
    }

    #[test]
    fn configured_agents_extend_and_override_roster() {
        let cfg = RouterConfig {
            agents: vec![
                AgentEntry {
                    display_name: "DocsWriter".to_string(),
                    key: None,
                    policy_title: None,
                },
                AgentEntry {
                    display_name: "TestRunner".to_string(),
                    key: None,
                    policy_title: Some("Strict Testing Policy".to_string()),
                },
            ],
            ..RouterConfig::default()
        };
        let roster = cfg.roster().expect("roster");
        let docs = roster.by_display_name("DocsWriter").expect("docs");
        assert_eq!(docs.key, "docs-writer");
        assert_eq!(docs.policy_title, "DocsWriter Policy");
        let tests = roster.by_display_name("TestRunner").expect("tests");
        assert_eq!(tests.key, "test-runner");
        assert_eq!(tests.policy_title, "Strict Testing Policy");
    }
}
