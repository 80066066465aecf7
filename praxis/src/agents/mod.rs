//! Agent wrappers, one per role.
//!
//! Each wrapper renders its prompt, records it next to the call's other
//! artifacts and hands a [`GenerationRequest`] to the configured generator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::types::{AgentReply, Role};
use crate::io::config::PraxisConfig;
use crate::io::fs_util::write_text;
use crate::io::generator::{GenerationRequest, TextGenerator};
use crate::io::prompt::PromptPack;

pub mod chat;
pub mod orchestrator;
pub mod refiner;
pub mod sub_agent;

pub use chat::ChatAgent;
pub use orchestrator::OrchestratorAgent;
pub use refiner::RefinerAgent;
pub use sub_agent::SubAgent;

/// Name of the directory holding agent artifacts inside a workspace.
pub const STATE_DIR_NAME: &str = ".praxis";
const REPLY_SCHEMA_FILE: &str = "agent_reply.schema.json";

/// Limits shared by every agent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    pub timeout: Duration,
}

impl AgentSettings {
    pub fn from_config(config: &PraxisConfig) -> Self {
        Self {
            prompt_budget_bytes: config.prompt_budget_bytes,
            output_limit_bytes: config.output_limit_bytes,
            timeout: Duration::from_secs(config.agent_timeout_secs),
        }
    }
}

/// `<root>/.praxis`, where schemas and per-call artifacts live.
pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR_NAME)
}

pub(crate) fn reply_schema_path(state_dir: &Path) -> PathBuf {
    state_dir.join(REPLY_SCHEMA_FILE)
}

/// Record the prompt under `call_dir` and run one generation.
pub(crate) fn invoke<G: TextGenerator + ?Sized>(
    generator: &G,
    role: Role,
    workdir: &Path,
    call_dir: &Path,
    schema_path: &Path,
    prompt: PromptPack,
    settings: &AgentSettings,
) -> Result<AgentReply> {
    let prompt_path = call_dir.join(format!("{role}.prompt.md"));
    write_text(&prompt_path, prompt.as_str())?;
    let request = GenerationRequest {
        role,
        workdir: workdir.to_path_buf(),
        prompt: prompt.into_string(),
        output_schema_path: schema_path.to_path_buf(),
        output_path: call_dir.join(format!("{role}.reply.json")),
        log_path: call_dir.join(format!("{role}.log")),
        timeout: settings.timeout,
        output_limit_bytes: settings.output_limit_bytes,
    };
    generator.generate(&request)
}
