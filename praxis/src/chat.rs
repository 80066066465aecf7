//! Interactive chat session with tool dispatch.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::{AgentSettings, ChatAgent, state_dir};
use crate::core::types::AgentReply;
use crate::io::generator::TextGenerator;
use crate::io::prompt::ChatPromptInputs;
use crate::io::records::{Speaker, append_conversation, save_chat};
use crate::io::workspace_store::{Session, WorkspaceError, WorkspaceScope};
use crate::tools::{ToolResult, dispatch};

/// What one `send` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub reply: String,
    pub tool_results: Vec<ToolResult>,
    /// Answer given after the tool results were fed back.
    pub follow_up: Option<String>,
}

/// One chat session: the role-tagged transcript plus the workspace it is
/// currently scoped to.
#[derive(Debug)]
pub struct ChatSession {
    id: String,
    scope: Option<WorkspaceScope>,
    transcript: Vec<String>,
    settings: AgentSettings,
    turns: u32,
}

impl ChatSession {
    pub fn new(session: &Session, settings: AgentSettings) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("chat-{}", &id[..8]),
            scope: session.current_scope(),
            transcript: Vec::new(),
            settings,
            turns: 0,
        }
    }

    pub fn scope(&self) -> Option<&WorkspaceScope> {
        self.scope.as_ref()
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Send one user message. Tool calls in the reply are dispatched and the
    /// chat role is asked once more with their results.
    pub fn send<G: TextGenerator + ?Sized>(
        &mut self,
        session: &mut Session,
        generator: &G,
        input: &str,
    ) -> Result<ChatTurn> {
        self.scope = session.current_scope();
        self.turns += 1;
        let call_dir = self.call_dir(session);

        let reply = self.ask(session, generator, input, &[], &call_dir)?;
        self.record(Speaker::User, input);
        self.record(Speaker::Praxis, &reply.text);
        if reply.tool_calls.is_empty() {
            return Ok(ChatTurn {
                reply: reply.text,
                tool_results: Vec::new(),
                follow_up: None,
            });
        }

        let tool_results = reply
            .tool_calls
            .iter()
            .map(|call| dispatch(session, call))
            .collect::<Vec<_>>();
        self.scope = session.current_scope();
        let rendered = tool_results.iter().map(ToolResult::render).collect::<Vec<_>>();
        debug!(tools = rendered.len(), "feeding tool results back");

        // Tools may have switched or deleted the workspace the turn started in.
        let follow_up_dir = self.call_dir(session).join("follow_up");
        let follow_up = self.ask(session, generator, input, &rendered, &follow_up_dir)?;
        self.record(Speaker::Praxis, &follow_up.text);
        Ok(ChatTurn {
            reply: reply.text,
            tool_results,
            follow_up: Some(follow_up.text),
        })
    }

    /// Save the transcript as a chat file of the current workspace.
    pub fn save(&self, title: &str) -> Result<PathBuf> {
        let scope = self.scope.as_ref().ok_or(WorkspaceError::NoneSelected)?;
        let mut contents = self.transcript.join("\n");
        contents.push('\n');
        save_chat(scope, title, &contents)
    }

    fn ask<G: TextGenerator + ?Sized>(
        &self,
        session: &Session,
        generator: &G,
        input: &str,
        tool_results: &[String],
        call_dir: &std::path::Path,
    ) -> Result<AgentReply> {
        let workdir = self
            .scope
            .as_ref()
            .map_or_else(|| session.store().base_path().to_path_buf(), |scope| scope.path.clone());
        let agent = ChatAgent::new(&state_dir(&workdir), self.settings.clone());
        let inputs = ChatPromptInputs {
            workspace: self.scope.as_ref(),
            transcript: &self.transcript,
            tool_results,
            input,
        };
        agent.run(generator, &inputs, &workdir, call_dir)
    }

    fn call_dir(&self, session: &Session) -> PathBuf {
        let root = match &self.scope {
            Some(scope) => scope.path.clone(),
            None => session.store().base_path().to_path_buf(),
        };
        state_dir(&root)
            .join("chats")
            .join(&self.id)
            .join(format!("{:04}", self.turns))
    }

    fn record(&mut self, speaker: Speaker, text: &str) {
        let line = speaker.tag(text);
        if let Some(scope) = &self.scope
            && let Err(err) = append_conversation(scope, speaker, text)
        {
            warn!(workspace = %scope.title, err = %format!("{err:#}"), "could not append conversation log");
        }
        self.transcript.push(line);
        info!(speaker = speaker.label(), "chat line recorded");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::{Role, ToolCall};
    use crate::io::records::{list_chats, load_conversation};
    use crate::test_support::{FailingGenerator, ScriptedGenerator, TestBase, tool_reply};

    #[test]
    fn plain_reply_is_logged_to_workspace() {
        let (mut base, scope) = TestBase::with_workspace("demo");
        let generator = ScriptedGenerator::new();
        generator.push_text(Role::Chat, "hi there");
        let mut chat = ChatSession::new(&base.session, AgentSettings::from_config(&base.config));

        let turn = chat.send(&mut base.session, &generator, "hello").expect("send");

        assert_eq!(turn.reply, "hi there");
        assert!(turn.follow_up.is_none());
        assert_eq!(chat.transcript(), ["You: hello", "Praxis: hi there"]);
        assert_eq!(
            load_conversation(&scope).expect("load"),
            vec!["You: hello", "Praxis: hi there"]
        );
    }

    #[test]
    fn tool_calls_are_dispatched_and_answered() {
        let mut base = TestBase::new();
        let generator = ScriptedGenerator::new();
        generator.push(
            Role::Chat,
            tool_reply(
                "creating it",
                vec![ToolCall::CreateWorkspace {
                    title: "travel".to_string(),
                    description: "trip plans".to_string(),
                }],
            ),
        );
        generator.push_text(Role::Chat, "workspace ready");
        let mut chat = ChatSession::new(&base.session, AgentSettings::from_config(&base.config));
        assert!(chat.scope().is_none());

        let turn = chat
            .send(&mut base.session, &generator, "make a travel workspace")
            .expect("send");

        assert_eq!(turn.tool_results.len(), 1);
        assert!(turn.tool_results[0].ok);
        assert_eq!(turn.follow_up.as_deref(), Some("workspace ready"));
        assert_eq!(chat.scope().map(|scope| scope.title.as_str()), Some("travel"));

        let follow_up = generator.last_request().expect("request");
        assert!(follow_up.prompt.contains("create_workspace: created workspace 'travel'"));
        assert_eq!(chat.transcript().len(), 3);
    }

    #[test]
    fn deleting_current_workspace_does_not_recreate_it() {
        let (mut base, scope) = TestBase::with_workspace("demo");
        let generator = ScriptedGenerator::new();
        generator.push(
            Role::Chat,
            tool_reply(
                "removing it",
                vec![ToolCall::DeleteWorkspace {
                    title: "demo".to_string(),
                }],
            ),
        );
        generator.push_text(Role::Chat, "gone");
        let mut chat = ChatSession::new(&base.session, AgentSettings::from_config(&base.config));

        let turn = chat.send(&mut base.session, &generator, "delete demo").expect("send");

        assert!(turn.tool_results[0].ok);
        assert_eq!(turn.follow_up.as_deref(), Some("gone"));
        assert!(chat.scope().is_none());
        assert!(!scope.path.exists());
        let follow_up = generator.last_request().expect("request");
        assert!(follow_up.output_path.starts_with(base.session.store().base_path()));
        assert!(!follow_up.output_path.starts_with(&scope.path));
    }

    #[test]
    fn failed_send_keeps_earlier_transcript() {
        let mut base = TestBase::new();
        let scripted = ScriptedGenerator::new();
        scripted.push_text(Role::Chat, "first answer");
        let mut chat = ChatSession::new(&base.session, AgentSettings::from_config(&base.config));
        chat.send(&mut base.session, &scripted, "first").expect("send");

        let err = chat
            .send(&mut base.session, &FailingGenerator::new("service down"), "second")
            .unwrap_err();
        assert!(format!("{err:#}").contains("service down"));
        assert_eq!(chat.transcript(), ["You: first", "Praxis: first answer"]);
    }

    #[test]
    fn save_requires_workspace_and_writes_transcript() {
        let mut base = TestBase::new();
        let generator = ScriptedGenerator::new();
        generator.push_text(Role::Chat, "sure");
        let mut chat = ChatSession::new(&base.session, AgentSettings::from_config(&base.config));
        chat.send(&mut base.session, &generator, "hey").expect("send");
        assert!(chat.save("untitled").is_err());

        let scope = base.session.create("demo", "d").expect("create");
        generator.push_text(Role::Chat, "ok");
        chat.send(&mut base.session, &generator, "again").expect("send");
        let path = chat.save("plans").expect("save");

        let saved = fs::read_to_string(path).expect("read");
        assert_eq!(saved, "You: hey\nPraxis: sure\nYou: again\nPraxis: ok\n");
        assert_eq!(list_chats(&scope).expect("list")[0].title, "plans");
    }
}
