//! Shared deterministic types for the decomposition loop.
//!
//! These types define stable contracts between the loop, the agent wrappers
//! and the persistence layer. They do not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// One unit of work proposed by the orchestrator and executed by the sub-agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub result: Option<String>,
}

/// Run-scoped state owned by exactly one invocation of the loop.
///
/// `previous_results` mirrors the `result` of each completed task, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContext {
    pub objective: String,
    pub previous_results: Vec<String>,
    pub tasks: Vec<Task>,
}

impl AgentContext {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            previous_results: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn completed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .count()
    }
}

/// The remote text-generation roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Orchestrator,
    SubAgent,
    Refiner,
    Chat,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Orchestrator => "orchestrator",
            Role::SubAgent => "sub_agent",
            Role::Refiner => "refiner",
            Role::Chat => "chat",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply from any agent role.
///
/// `complete` is only meaningful for the orchestrator; when absent the legacy
/// textual marker decides (see [`crate::core::completion`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            complete: None,
            tool_calls: Vec::new(),
        }
    }
}

/// Closed set of capabilities the chat role may invoke.
///
/// Wire form is `{"name": "...", "arguments": {...}}`; argument-less calls
/// carry an empty object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    CreateWorkspace { title: String, description: String },
    ListWorkspaces {},
    EnterWorkspace { title: String },
    DeleteWorkspace { title: String },
    CreateFolder { workspace: String, folder: String },
    ReadConversationHistory {},
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::CreateWorkspace { .. } => "create_workspace",
            ToolCall::ListWorkspaces {} => "list_workspaces",
            ToolCall::EnterWorkspace { .. } => "enter_workspace",
            ToolCall::DeleteWorkspace { .. } => "delete_workspace",
            ToolCall::CreateFolder { .. } => "create_folder",
            ToolCall::ReadConversationHistory {} => "read_conversation_history",
        }
    }
}
