//! Praxis configuration stored under `<base_path>/praxis.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Role;

pub const CONFIG_FILE_NAME: &str = "praxis.toml";

/// Praxis configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields fall back to
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PraxisConfig {
    /// Orchestrator calls allowed before a run stops as incomplete.
    pub max_iterations: u32,

    /// Wall-clock limit for a single agent call, in seconds.
    pub agent_timeout_secs: u64,

    /// Truncate agent stdout/stderr capture beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Rendered prompts are trimmed to fit this many bytes.
    pub prompt_budget_bytes: usize,

    /// Characters of the sanitized objective kept in run-log file names.
    pub log_objective_chars: usize,

    pub retry: RetryConfig,

    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first failed agent call.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentsConfig {
    pub orchestrator: AgentCommandConfig,
    pub sub_agent: AgentCommandConfig,
    pub refiner: AgentCommandConfig,
    pub chat: AgentCommandConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            orchestrator: AgentCommandConfig::with_model("gpt-4o"),
            sub_agent: AgentCommandConfig::with_model("gpt-4o-mini"),
            refiner: AgentCommandConfig::with_model("gpt-4o-mini"),
            chat: AgentCommandConfig::with_model("gpt-4o-mini"),
        }
    }
}

impl AgentsConfig {
    pub fn for_role(&self, role: Role) -> &AgentCommandConfig {
        match role {
            Role::Orchestrator => &self.orchestrator,
            Role::SubAgent => &self.sub_agent,
            Role::Refiner => &self.refiner,
            Role::Chat => &self.chat,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentCommandConfig {
    /// Program and leading arguments (e.g. `["codex","exec"]`).
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentCommandConfig {
    fn with_model(model: &str) -> Self {
        Self {
            model: Some(model.to_string()),
            ..Self::default()
        }
    }
}

impl Default for AgentCommandConfig {
    fn default() -> Self {
        Self {
            command: ["codex", "exec", "--skip-git-repo-check", "--sandbox", "read-only"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            model: None,
        }
    }
}

impl Default for PraxisConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            agent_timeout_secs: 600,
            output_limit_bytes: 200_000,
            prompt_budget_bytes: 60_000,
            log_objective_chars: 25,
            retry: RetryConfig::default(),
            agents: AgentsConfig::default(),
        }
    }
}

impl PraxisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        for role in [Role::Orchestrator, Role::SubAgent, Role::Refiner, Role::Chat] {
            let agent = self.agents.for_role(role);
            if agent.command.is_empty() || agent.command[0].trim().is_empty() {
                return Err(anyhow!("agents.{role}.command must be a non-empty array"));
            }
        }
        Ok(())
    }
}

pub fn config_path(base_path: &Path) -> PathBuf {
    base_path.join(CONFIG_FILE_NAME)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PraxisConfig::default()`.
pub fn load_config(path: &Path) -> Result<PraxisConfig> {
    if !path.exists() {
        let cfg = PraxisConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PraxisConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PraxisConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::fs_util::write_atomic(path, buf.as_bytes())
}
