// src/config.rs

//! Configuration loading and validation for `taskforge`.
//!
//! Configuration lives in an optional `taskforge.toml`:
//!
//! ```toml
//! [backend]
//! program = "claude"
//!
//! [scheduler]
//! max_concurrent = 3
//!
//! [[agent]]
//! id = "reviewer"
//! name = "Code Reviewer"
//! role = "Review code and point out defects."
//! permissions = { read = true, write = false, delete = false }
//! ```
//!
//! A missing file is not an error; built-in defaults apply. CLI flags
//! override file values. Loaded configs are validated before use.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{ForgeError, Result};
use crate::types::AgentProfile;

/// Default config filename looked up in the current working directory.
pub const DEFAULT_CONFIG_FILE: &str = "taskforge.toml";

/// Flags that put the default backend into non-interactive,
/// permission-unchecked, single-shot output mode.
pub const DEFAULT_BACKEND_ARGS: &[&str] = &["--print", "--dangerously-skip-permissions"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Agent profiles selectable with `--agent`. Optional; a built-in
    /// default profile is always available.
    #[serde(default, rename = "agent")]
    pub agents: Vec<AgentProfile>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            backend: BackendSection::default(),
            scheduler: SchedulerSection::default(),
            agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    /// Backend program name or path.
    #[serde(default = "default_program")]
    pub program: String,
    /// Fixed flags passed on every invocation. The prompt itself is never
    /// an argument; it is delivered over stdin.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Hard cap on concurrently running tasks. Submissions beyond the cap
    /// are rejected, not queued.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_program() -> String {
    "claude".to_string()
}

fn default_args() -> Vec<String> {
    DEFAULT_BACKEND_ARGS.iter().map(|s| s.to_string()).collect()
}

fn default_max_concurrent() -> usize {
    3
}

/// Load configuration.
///
/// - With an explicit path, the file must exist and parse.
/// - Without one, `taskforge.toml` in the current directory is used if
///   present; otherwise built-in defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<ForgeConfig> {
    let cfg = match path {
        Some(p) => parse_file(p)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                parse_file(default_path)?
            } else {
                debug!("no config file found; using built-in defaults");
                ForgeConfig::default()
            }
        }
    };

    validate(&cfg)?;
    Ok(cfg)
}

fn parse_file(path: &Path) -> Result<ForgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ForgeError::ConfigError(format!("cannot read config file {}: {e}", path.display()))
    })?;
    let cfg: ForgeConfig = toml::from_str(&raw)?;
    debug!(path = %path.display(), "loaded config file");
    Ok(cfg)
}

/// Reject configs that cannot work before any task is admitted.
pub fn validate(cfg: &ForgeConfig) -> Result<()> {
    if cfg.scheduler.max_concurrent == 0 {
        return Err(ForgeError::ConfigError(
            "scheduler.max_concurrent must be at least 1".to_string(),
        ));
    }

    if cfg.backend.program.trim().is_empty() {
        return Err(ForgeError::ConfigError(
            "backend.program must not be empty".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for agent in &cfg.agents {
        if agent.id.trim().is_empty() {
            return Err(ForgeError::ConfigError(
                "agent.id must not be empty".to_string(),
            ));
        }
        if !seen.insert(agent.id.as_str()) {
            return Err(ForgeError::ConfigError(format!(
                "duplicate agent id: {}",
                agent.id
            )));
        }
    }

    Ok(())
}

/// Resolve an agent profile by name or id, falling back to the built-in
/// default when `selector` is `None`.
pub fn resolve_agent(cfg: &ForgeConfig, selector: Option<&str>) -> Result<AgentProfile> {
    match selector {
        None => Ok(cfg
            .agents
            .first()
            .cloned()
            .unwrap_or_else(AgentProfile::default_profile)),
        Some(wanted) => cfg
            .agents
            .iter()
            .find(|a| a.name == wanted || a.id == wanted)
            .cloned()
            .ok_or_else(|| ForgeError::ConfigError(format!("unknown agent profile: {wanted}"))),
    }
}
