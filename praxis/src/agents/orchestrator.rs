//! Orchestrator agent: proposes the next sub-task or declares completion.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::types::{AgentContext, AgentReply, Role};
use crate::io::generator::TextGenerator;
use crate::io::prompt::PromptBuilder;
use crate::io::workspace_store::WorkspaceScope;

use super::{AgentSettings, invoke, reply_schema_path};

#[derive(Debug, Clone)]
pub struct OrchestratorAgent {
    schema_path: PathBuf,
    settings: AgentSettings,
}

impl OrchestratorAgent {
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
        let prompt = PromptBuilder::new(self.settings.prompt_budget_bytes).orchestrator(scope, context)?;
        invoke(
            generator,
            Role::Orchestrator,
            &scope.path,
            call_dir,
            &self.schema_path,
            prompt,
            &self.settings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedGenerator, TestBase};

    /// Verifies the request points at the workspace and the per-call directory.
    #[test]
    fn request_uses_workspace_and_call_dir() {
        let (base, scope) = TestBase::with_workspace("demo");
        let generator = ScriptedGenerator::new();
        generator.push_text(Role::Orchestrator, "next step");
        let state = super::super::state_dir(&scope.path);
        let agent = OrchestratorAgent::new(&state, AgentSettings::from_config(&base.config));
        let call_dir = state.join("runs").join("run-x").join("1");

        let reply = agent
            .run(&generator, &scope, &AgentContext::new("goal"), &call_dir)
            .expect("run");

        assert_eq!(reply.text, "next step");
        let request = generator.last_request().expect("request");
        assert_eq!(request.role, Role::Orchestrator);
        assert_eq!(request.workdir, scope.path);
        assert_eq!(request.output_path, call_dir.join("orchestrator.reply.json"));
        assert_eq!(request.output_schema_path, state.join("agent_reply.schema.json"));
        assert!(request.prompt.contains("goal"));
        assert!(call_dir.join("orchestrator.prompt.md").is_file());
    }
}
