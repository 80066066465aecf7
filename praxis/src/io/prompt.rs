//! Prompt rendering for every agent role.
//!
//! Templates are embedded Markdown split into sections by
//! `<!-- section:KEY required|droppable -->` markers. When a rendered prompt
//! exceeds the byte budget, droppable sections go first, then the last
//! remaining section is truncated.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{AgentContext, Task};
use crate::io::workspace_store::WorkspaceScope;

const ORCHESTRATOR_TEMPLATE: &str = include_str!("prompts/orchestrator.md");
const SUB_AGENT_TEMPLATE: &str = include_str!("prompts/sub_agent.md");
const REFINER_TEMPLATE: &str = include_str!("prompts/refiner.md");
const CHAT_TEMPLATE: &str = include_str!("prompts/chat.md");

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 3] = ["history", "previous", "tool_results"];
const TRUNCATION_NOTICE: &str = "\n[truncated]";

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("orchestrator", ORCHESTRATOR_TEMPLATE)
        .expect("orchestrator template should be valid");
    env.add_template("sub_agent", SUB_AGENT_TEMPLATE)
        .expect("sub_agent template should be valid");
    env.add_template("refiner", REFINER_TEMPLATE)
        .expect("refiner template should be valid");
    env.add_template("chat", CHAT_TEMPLATE)
        .expect("chat template should be valid");
    env
});

#[derive(Debug, Clone, Serialize)]
struct WorkspaceView {
    title: String,
    path: String,
}

impl From<&WorkspaceScope> for WorkspaceView {
    fn from(scope: &WorkspaceScope) -> Self {
        Self {
            title: scope.title.clone(),
            path: scope.path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct PreviousTaskView<'a> {
    description: &'a str,
    result: &'a str,
}

/// Inputs of one chat turn.
#[derive(Debug, Clone, Copy)]
pub struct ChatPromptInputs<'a> {
    pub workspace: Option<&'a WorkspaceScope>,
    pub transcript: &'a [String],
    pub tool_results: &'a [String],
    pub input: &'a str,
}

/// Builds role prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn orchestrator(&self, scope: &WorkspaceScope, context: &AgentContext) -> Result<PromptPack> {
        self.build(
            "orchestrator",
            context! {
                workspace => WorkspaceView::from(scope),
                objective => context.objective.trim(),
                results => &context.previous_results,
            },
        )
    }

    /// `previous` holds the tasks created before `task`, in order.
    pub fn sub_agent(&self, scope: &WorkspaceScope, task: &Task, previous: &[Task]) -> Result<PromptPack> {
        let previous = previous
            .iter()
            .map(|item| PreviousTaskView {
                description: item.description.trim(),
                result: item.result.as_deref().unwrap_or("(no result)").trim(),
            })
            .collect::<Vec<_>>();
        self.build(
            "sub_agent",
            context! {
                workspace => WorkspaceView::from(scope),
                task => task.description.trim(),
                previous => previous,
            },
        )
    }

    pub fn refiner(&self, scope: &WorkspaceScope, context: &AgentContext) -> Result<PromptPack> {
        let results = context
            .tasks
            .iter()
            .filter_map(|task| task.result.as_deref())
            .collect::<Vec<_>>();
        self.build(
            "refiner",
            context! {
                workspace => WorkspaceView::from(scope),
                objective => context.objective.trim(),
                results => results,
            },
        )
    }

    pub fn chat(&self, inputs: &ChatPromptInputs<'_>) -> Result<PromptPack> {
        self.build(
            "chat",
            context! {
                workspace => inputs.workspace.map(WorkspaceView::from),
                transcript => inputs.transcript,
                tool_results => inputs.tool_results,
                input => inputs.input.trim(),
            },
        )
    }

    fn build(&self, template: &str, ctx: minijinja::Value) -> Result<PromptPack> {
        let rendered = ENGINE
            .get_template(template)
            .and_then(|tmpl| tmpl.render(ctx))
            .with_context(|| format!("render {template} prompt"))?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(PromptPack {
            content: render_sections(&sections),
        })
    }
}

/// A rendered prompt ready to send to an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_string(self) -> String {
        self.content
    }
}

#[derive(Debug, Clone)]
struct Section {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<Section> {
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let markers = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| Some((caps.get(0)?, caps.get(1)?, caps.get(2)?)))
        .collect::<Vec<_>>();

    let mut sections = Vec::new();
    for (i, (whole, key, kind)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map_or(rendered.len(), |(next, _, _)| next.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(Section {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[Section]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

fn apply_budget(sections: &mut Vec<Section>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped = sections.remove(idx);
            debug!(
                section = key,
                bytes_dropped = dropped.content.len(),
                "dropped section for budget"
            );
        }
    }

    let total = total_len(sections);
    let Some(last) = sections.last_mut() else {
        return;
    };
    if total <= budget {
        return;
    }
    let allowed = budget.saturating_sub(total - last.content.len());
    let before_len = last.content.len();
    if allowed > TRUNCATION_NOTICE.len() {
        truncate_on_char_boundary(&mut last.content, allowed - TRUNCATION_NOTICE.len());
        last.content.push_str(TRUNCATION_NOTICE);
    } else {
        truncate_on_char_boundary(&mut last.content, allowed);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn truncate_on_char_boundary(value: &mut String, max_bytes: usize) {
    let mut cut = max_bytes.min(value.len());
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value.truncate(cut);
}

fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
