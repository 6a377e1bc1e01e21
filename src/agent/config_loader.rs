//! Agent configuration loader
//!
//! Loads agent overrides from YAML files:
//! - Global: ~/.config/bmo/agents/*.yaml (XDG_CONFIG_HOME)
//! - Project: .bmo/agents/*.yaml
//!
//! The file stem is the agent name. Project files override global files with
//! the same name; both are merged onto the built-in definition when one exists.
//! A file that fails to parse is an error, not a silent fallback to the
//! built-in definition.

use super::config::{AgentConfig, AgentOverride};
use anyhow::Context as _;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Load all agent overrides from global and project directories
///
/// Priority: project configs override global configs
pub fn load_agent_overrides(working_dir: &Path) -> anyhow::Result<HashMap<String, Vec<AgentOverride>>> {
    let mut overrides = HashMap::new();

    // Load global configs first (lower priority)
    if let Some(global_dir) = global_config_dir() {
        load_overrides_from_dir(&global_dir, &mut overrides)?;
    }

    // Project configs are applied after, so they win
    load_overrides_from_dir(&project_config_dir(working_dir), &mut overrides)?;

    Ok(overrides)
}

/// Merge loaded overrides onto `agents`. Names without a base start from
/// `AgentConfig::new(name)`.
pub fn apply_overrides(
    agents: &mut HashMap<String, AgentConfig>,
    overrides: HashMap<String, Vec<AgentOverride>>,
) {
    for (name, layers) in overrides {
        let base = agents
            .remove(&name)
            .unwrap_or_else(|| AgentConfig::new(name.clone()));
        let mut merged = layers.into_iter().fold(base, |acc, layer| layer.apply(acc));
        merged.name = name.clone();
        agents.insert(name, merged);
    }
}

/// Get the global agent config directory
/// Uses XDG_CONFIG_HOME or falls back to ~/.config
fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bmo").join("agents"))
}

fn project_config_dir(working_dir: &Path) -> PathBuf {
    working_dir.join(".bmo").join("agents")
}

/// Load all .yaml files from a directory, appending one layer per agent
fn load_overrides_from_dir(
    dir: &Path,
    overrides: &mut HashMap<String, Vec<AgentOverride>>,
) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read agent config directory {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        // Only process .yaml and .yml files
        let ext = path.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("yaml") | Some("yml")) {
            continue;
        }

        // Agent name is the file stem
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        let layer = load_override_file(&path).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %format!("{:#}", e), "Invalid agent config");
        })?;
        tracing::debug!(agent = %name, path = %path.display(), "Loaded agent override");
        overrides.entry(name).or_default().push(layer);
    }

    Ok(())
}

/// Load a single agent override from a YAML file
pub fn load_override_file(path: &Path) -> anyhow::Result<AgentOverride> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // An empty file is a valid no-op override
    if content.trim().is_empty() {
        return Ok(AgentOverride::default());
    }

    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse YAML in {}", path.display()))
}
