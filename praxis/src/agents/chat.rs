//! Chat agent: answers the user and may request tool calls.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::types::{AgentReply, Role};
use crate::io::generator::TextGenerator;
use crate::io::prompt::{ChatPromptInputs, PromptBuilder};

use super::{AgentSettings, invoke, reply_schema_path};

#[derive(Debug, Clone)]
pub struct ChatAgent {
    schema_path: PathBuf,
    settings: AgentSettings,
}

impl ChatAgent {
    pub fn new(state_dir: &Path, settings: AgentSettings) -> Self {
        Self {
            schema_path: reply_schema_path(state_dir),
            settings,
        }
    }

    /// `workdir` is the selected workspace, or the base directory when none is.
    pub fn run<G: TextGenerator + ?Sized>(
        &self,
        generator: &G,
        inputs: &ChatPromptInputs<'_>,
        workdir: &Path,
        call_dir: &Path,
    ) -> Result<AgentReply> {
        let prompt = PromptBuilder::new(self.settings.prompt_budget_bytes).chat(inputs)?;
        invoke(
            generator,
            Role::Chat,
            workdir,
            call_dir,
            &self.schema_path,
            prompt,
            &self.settings,
        )
    }
}
