//! Completion detection for orchestrator replies.
//!
//! A structured `complete` flag always wins. Replies without one fall back to
//! the legacy textual marker, matched as a prefix after leading whitespace and
//! markdown decoration are stripped.

use super::types::AgentReply;

/// Literal marker the orchestrator prompt asks for when the objective is met.
pub const COMPLETION_MARKER: &str = "The task is complete:";

/// What the loop should do with an orchestrator reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorDecision {
    /// The reply text is the next sub-task description.
    NextTask(String),
    /// The objective is met; the text is the orchestrator's closing summary.
    Complete(String),
}

/// Classify an orchestrator reply.
pub fn classify(reply: &AgentReply) -> OrchestratorDecision {
    let complete = reply
        .complete
        .unwrap_or_else(|| has_completion_marker(&reply.text));
    if complete {
        OrchestratorDecision::Complete(reply.text.clone())
    } else {
        OrchestratorDecision::NextTask(reply.text.clone())
    }
}

/// True when `text` starts with [`COMPLETION_MARKER`], ignoring leading
/// whitespace and markdown emphasis, heading, and quote characters.
pub fn has_completion_marker(text: &str) -> bool {
    text.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '#' | '>'))
        .starts_with(COMPLETION_MARKER)
}
