//! Agent registry: one entity per worker, looked up by display name or key.

use serde::{Deserialize, Serialize};

/// A worker agent known to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Canonical key passed to the invoker (e.g. `file-creator`).
    pub key: String,
    /// Name used in routing lines (e.g. `FileCreator`).
    pub display_name: String,
    /// Policy the agent must acknowledge before acting.
    pub policy_title: String,
}

impl AgentProfile {
    pub fn new(key: &str, display_name: &str, policy_title: &str) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            policy_title: policy_title.to_string(),
        }
    }

    /// Derive key and policy title from a display name.
    pub fn from_display_name(display_name: &str) -> Self {
        Self {
            key: to_kebab(display_name),
            display_name: display_name.trim().to_string(),
            policy_title: policy_for_role(display_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("agent display name must be a non-empty identifier, got '{0}'")]
    InvalidDisplayName(String),
    #[error("agent key must be non-empty for '{0}'")]
    EmptyKey(String),
    #[error("duplicate agent display name '{0}'")]
    DuplicateName(String),
    #[error("duplicate agent key '{0}'")]
    DuplicateKey(String),
}

/// Registry of routable agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRoster {
    profiles: Vec<AgentProfile>,
}

const DEFAULT_AGENTS: [(&str, &str, &str); 9] = [
    ("file-creator", "FileCreator", "File Ops Policy"),
    ("git-workflow", "GitWorkflow", "Safe Git Policy"),
    ("test-runner", "TestRunner", "Testing Policy"),
    ("frontend-developer", "FrontendDeveloper", "UI Policy"),
    ("backend-developer", "BackendDeveloper", "API & Services Policy"),
    ("ui-designer", "UIDesigner", "Design Artifacts Policy"),
    ("sprint-prioritizer", "SprintPrioritizer", "Planning Policy"),
    ("rapid-prototyper", "RapidPrototyper", "Prototype Policy"),
    ("ux-researcher", "UXResearcher", "Research Artifacts Policy"),
];

impl Default for AgentRoster {
    fn default() -> Self {
        Self {
            profiles: DEFAULT_AGENTS
                .iter()
                .map(|(key, name, policy)| AgentProfile::new(key, name, policy))
                .collect(),
        }
    }
}

impl AgentRoster {
    /// Build a roster, rejecting blank or duplicate names and keys.
    pub fn new(profiles: Vec<AgentProfile>) -> Result<Self, RosterError> {
        let mut roster = Self {
            profiles: Vec::with_capacity(profiles.len()),
        };
        for profile in profiles {
            roster.insert(profile)?;
        }
        Ok(roster)
    }

    /// Add a profile, or replace the one with the same display name.
    pub fn upsert(&mut self, profile: AgentProfile) -> Result<(), RosterError> {
        validate_profile(&profile)?;
        if let Some(clash) = self.profiles.iter().find(|existing| {
            existing.key == profile.key && existing.display_name != profile.display_name
        }) {
            return Err(RosterError::DuplicateKey(clash.key.clone()));
        }
        match self
            .profiles
            .iter_mut()
            .find(|existing| existing.display_name == profile.display_name)
        {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
        Ok(())
    }

    fn insert(&mut self, profile: AgentProfile) -> Result<(), RosterError> {
        validate_profile(&profile)?;
        if self.by_display_name(&profile.display_name).is_some() {
            return Err(RosterError::DuplicateName(profile.display_name));
        }
        if self.by_key(&profile.key).is_some() {
            return Err(RosterError::DuplicateKey(profile.key));
        }
        self.profiles.push(profile);
        Ok(())
    }

    pub fn by_display_name(&self, name: &str) -> Option<&AgentProfile> {
        self.profiles.iter().find(|p| p.display_name == name)
    }

    pub fn by_key(&self, key: &str) -> Option<&AgentProfile> {
        self.profiles.iter().find(|p| p.key == key)
    }

    /// Resolve by display name first, then by canonical key.
    pub fn resolve(&self, name: &str) -> Option<&AgentProfile> {
        self.by_display_name(name).or_else(|| self.by_key(name))
    }

    pub fn profiles(&self) -> &[AgentProfile] {
        &self.profiles
    }
}

fn validate_profile(profile: &AgentProfile) -> Result<(), RosterError> {
    let name = &profile.display_name;
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(RosterError::InvalidDisplayName(name.clone()));
    }
    if profile.key.trim().is_empty() {
        return Err(RosterError::EmptyKey(name.clone()));
    }
    Ok(())
}

/// Convert a display name to a kebab-case key (`UXResearcher` -> `ux-researcher`).
pub fn to_kebab(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_whitespace() || c == '_' || c == '-' {
            out.push('-');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                out.push('-');
            }
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        }
    }
    out.split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Pick a policy title from role keywords in the display name.
pub fn policy_for_role(name: &str) -> String {
    let t = name.to_lowercase();
    let has = |needle: &str| t.contains(needle);
    let title = if has("ux") || has("research") {
        "Research Artifacts Policy"
    } else if has("design") || (has("ui") && !has("front")) {
        "Design Artifacts Policy"
    } else if has("front") {
        "UI Policy"
    } else if has("back") || has("api") || has("service") {
        "API & Services Policy"
    } else if has("file") {
        "File Ops Policy"
    } else if has("git") {
        "Safe Git Policy"
    } else if has("test") {
        "Testing Policy"
    } else if has("proto") || has("rapid") {
        "Prototype Policy"
    } else if has("sprint") || has("priorit") {
        "Planning Policy"
    } else if has("router") {
        "Orchestrator Policy"
    } else {
        return format!("{} Policy", name.trim());
    };
    title.to_string()
}
