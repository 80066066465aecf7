//! Test-only helpers: scripted generators and a temporary base directory.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use crate::core::completion::COMPLETION_MARKER;
use crate::core::types::{AgentReply, Role, ToolCall};
use crate::io::config::PraxisConfig;
use crate::io::generator::{GenerationRequest, TextGenerator};
use crate::io::workspace_store::{Session, WorkspaceScope, WorkspaceStore};

enum Scripted {
    Reply(AgentReply),
    Error(String),
}

/// Generator returning queued replies per role without spawning processes.
///
/// When a role's queue is empty the fallback reply is used if one is set;
/// otherwise the call fails.
#[derive(Default)]
pub struct ScriptedGenerator {
    queues: Mutex<HashMap<Role, VecDeque<Scripted>>>,
    fallback: Mutex<HashMap<Role, AgentReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, role: Role, reply: AgentReply) {
        lock(&self.queues)
            .entry(role)
            .or_default()
            .push_back(Scripted::Reply(reply));
    }

    pub fn push_text(&self, role: Role, text: &str) {
        self.push(role, AgentReply::text(text));
    }

    pub fn push_error(&self, role: Role, message: &str) {
        lock(&self.queues)
            .entry(role)
            .or_default()
            .push_back(Scripted::Error(message.to_string()));
    }

    /// Reply used once `role`'s queue is drained.
    pub fn set_fallback(&self, role: Role, reply: AgentReply) {
        lock(&self.fallback).insert(role, reply);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Number of calls made for `role`.
    pub fn calls(&self, role: Role) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|request| request.role == role)
            .count()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply> {
        lock(&self.requests).push(request.clone());
        let next = lock(&self.queues)
            .get_mut(&request.role)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Error(message)) => Err(anyhow!(message)),
            None => lock(&self.fallback)
                .get(&request.role)
                .cloned()
                .ok_or_else(|| anyhow!("no scripted reply left for {}", request.role)),
        }
    }
}

/// Generator whose every call fails with the same message.
pub struct FailingGenerator {
    pub message: String,
}

impl FailingGenerator {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl TextGenerator for FailingGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<AgentReply> {
        Err(anyhow!("{} ({})", self.message, request.role))
    }
}

/// Temporary base directory with an in-memory session and default config.
pub struct TestBase {
    pub dir: tempfile::TempDir,
    pub session: Session,
    pub config: PraxisConfig,
}

impl TestBase {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WorkspaceStore::open(dir.path()).expect("open store");
        Self {
            dir,
            session: Session::new(store),
            config: PraxisConfig::default(),
        }
    }

    /// A base with one workspace, already selected.
    pub fn with_workspace(title: &str) -> (Self, WorkspaceScope) {
        let mut base = Self::new();
        let scope = base
            .session
            .create(title, &format!("{title} workspace"))
            .expect("create workspace");
        (base, scope)
    }
}

impl Default for TestBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrator reply carrying the legacy completion marker.
pub fn completion_reply(summary: &str) -> AgentReply {
    AgentReply::text(format!("{COMPLETION_MARKER} {summary}"))
}

/// Structured reply with an explicit completion flag.
pub fn flagged_reply(text: &str, complete: bool) -> AgentReply {
    AgentReply {
        text: text.to_string(),
        complete: Some(complete),
        tool_calls: Vec::new(),
    }
}

pub fn tool_reply(text: &str, tool_calls: Vec<ToolCall>) -> AgentReply {
    AgentReply {
        text: text.to_string(),
        complete: None,
        tool_calls,
    }
}

/// Refiner text describing a single-file project.
pub fn single_file_refinement(project: &str, file: &str, code: &str) -> String {
    format!(
        "Project Name: {project}\n\n<folder_structure>\n{{\"{file}\": null}}\n</folder_structure>\n\nFilename: {file}\n```\n{code}\n```\n"
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
