//! Dispatch of chat tool calls against the workspace session.

use serde::Serialize;
use tracing::{info, warn};

use crate::core::types::ToolCall;
use crate::io::records::load_conversation;
use crate::io::workspace_store::Session;

/// Outcome of one tool call, fed back to the chat role as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub name: &'static str,
    pub ok: bool,
    pub output: String,
}

impl ToolResult {
    fn ok(name: &'static str, output: String) -> Self {
        Self {
            name,
            ok: true,
            output,
        }
    }

    /// `name: output`, or `name failed: output`.
    pub fn render(&self) -> String {
        if self.ok {
            format!("{}: {}", self.name, self.output)
        } else {
            format!("{} failed: {}", self.name, self.output)
        }
    }
}

/// Execute `call`. Errors are reported in the result, never propagated.
pub fn dispatch(session: &mut Session, call: &ToolCall) -> ToolResult {
    let name = call.name();
    info!(tool = name, "dispatching tool call");
    let result = match call {
        ToolCall::CreateWorkspace { title, description } => session
            .create(title, description)
            .map(|scope| format!("created workspace '{title}' at {}", scope.path.display()))
            .map_err(|err| err.to_string()),
        ToolCall::ListWorkspaces {} => Ok(list_workspaces(session)),
        ToolCall::EnterWorkspace { title } => session
            .select(title)
            .map(|scope| format!("entered workspace '{title}' at {}", scope.path.display()))
            .map_err(|err| err.to_string()),
        ToolCall::DeleteWorkspace { title } => session
            .delete(title)
            .map(|()| format!("deleted workspace '{title}'"))
            .map_err(|err| err.to_string()),
        ToolCall::CreateFolder { workspace, folder } => session
            .store()
            .create_folder(workspace, folder)
            .map(|path| format!("created folder {}", path.display()))
            .map_err(|err| err.to_string()),
        ToolCall::ReadConversationHistory {} => read_history(session),
    };
    match result {
        Ok(output) => ToolResult::ok(name, output),
        Err(output) => {
            warn!(tool = name, err = %output, "tool call failed");
            ToolResult {
                name,
                ok: false,
                output,
            }
        }
    }
}

fn list_workspaces(session: &Session) -> String {
    let workspaces = session.store().list();
    if workspaces.is_empty() {
        return "no workspaces".to_string();
    }
    workspaces
        .iter()
        .map(|summary| format!("- {}: {}", summary.title, summary.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_history(session: &Session) -> Result<String, String> {
    let scope = session.resolve(None).map_err(|err| err.to_string())?;
    let lines = load_conversation(&scope).map_err(|err| format!("{err:#}"))?;
    if lines.is_empty() {
        Ok("conversation history is empty".to_string())
    } else {
        Ok(lines.join("\n"))
    }
}
