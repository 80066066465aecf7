//! Refiner agent: synthesizes all sub-task results into the final output.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::types::{AgentContext, AgentReply, Role};
use crate::io::generator::TextGenerator;
use crate::io::prompt::PromptBuilder;
use crate::io::workspace_store::WorkspaceScope;

use super::{AgentSettings, invoke, reply_schema_path};

#[derive(Debug, Clone)]
pub struct RefinerAgent {
    schema_path: PathBuf,
    settings: AgentSettings,
}

impl RefinerAgent {
    pub fn new(state_dir: &Path, settings: AgentSettings) -> Self {
        Self {
            schema_path: reply_schema_path(state_dir),
            settings,
        }
    }

    pub fn run<G: TextGenerator + ?Sized>(
        &self,
        generator: &G,
        scope: &WorkspaceScope,
        context: &AgentContext,
        call_dir: &Path,
    ) -> Result<AgentReply> {
        let prompt = PromptBuilder::new(self.settings.prompt_budget_bytes).refiner(scope, context)?;
        invoke(
            generator,
            Role::Refiner,
            &scope.path,
            call_dir,
            &self.schema_path,
            prompt,
            &self.settings,
        )
    }
}
