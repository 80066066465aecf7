//! Sub-agent: executes one sub-task description.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::types::{AgentReply, Role, Task};
use crate::io::generator::TextGenerator;
use crate::io::prompt::PromptBuilder;
use crate::io::workspace_store::WorkspaceScope;

use super::{AgentSettings, invoke, reply_schema_path};

#[derive(Debug, Clone)]
pub struct SubAgent {
    schema_path: PathBuf,
    settings: AgentSettings,
}

impl SubAgent {
    pub fn new(state_dir: &Path, settings: AgentSettings) -> Self {
        Self {
            schema_path: reply_schema_path(state_dir),
            settings,
        }
    }

    /// `previous` are the tasks created before `task`, excluding it.
    pub fn run<G: TextGenerator + ?Sized>(
        &self,
        generator: &G,
        scope: &WorkspaceScope,
        task: &Task,
        previous: &[Task],
        call_dir: &Path,
    ) -> Result<AgentReply> {
        let prompt =
            PromptBuilder::new(self.settings.prompt_budget_bytes).sub_agent(scope, task, previous)?;
        invoke(
            generator,
            Role::SubAgent,
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
    use crate::core::ledger::create_task;
    use crate::test_support::{ScriptedGenerator, TestBase};

    #[test]
    fn prompt_carries_task_description() {
        let (base, scope) = TestBase::with_workspace("demo");
        let generator = ScriptedGenerator::new();
        generator.push_text(Role::SubAgent, "result");
        let state = super::super::state_dir(&scope.path);
        let agent = SubAgent::new(&state, AgentSettings::from_config(&base.config));

        let task = create_task("write the parser");
        let reply = agent
            .run(&generator, &scope, &task, &[], &state.join("call"))
            .expect("run");

        assert_eq!(reply.text, "result");
        let request = generator.last_request().expect("request");
        assert_eq!(request.role, Role::SubAgent);
        assert!(request.prompt.contains("write the parser"));
        assert!(!request.prompt.contains("### Previous Tasks"));
    }
}
