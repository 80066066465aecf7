//! Parsing of the refiner's textual artifact description.
//!
//! The refiner may embed three optional elements in its output:
//!
//! - a `Project Name: <name>` line,
//! - a `<folder_structure>{...}</folder_structure>` block holding strict JSON
//!   where `null` marks a file and an object marks a directory,
//! - any number of `Filename: <name>` headers, each followed by a fenced code
//!   block.
//!
//! Absent or malformed elements never fail parsing; they degrade to empty
//! values and a warning in [`RefinedArtifact::warnings`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde_json::Value;

use super::naming::{is_safe_component, sanitize};

static PROJECT_NAME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"Project Name:(.*)").unwrap());
static FOLDER_STRUCTURE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)<folder_structure>(.*?)</folder_structure>").unwrap()
});
static CODE_BLOCK_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)Filename:[\s*]*`?([^\s`*]+)`?\**\s*```[\w+.-]*\r?\n(.*?)\r?\n?```")
        .unwrap()
});

const FALLBACK_PROJECT_NAME: &str = "project";

/// One node of the declared folder tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderEntry {
    File,
    Directory(BTreeMap<String, FolderEntry>),
}

/// A `Filename:` header and the code fenced beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub filename: String,
    pub content: String,
}

/// Everything the materializer needs from one refiner reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefinedArtifact {
    pub project_name: Option<String>,
    pub folder_structure: BTreeMap<String, FolderEntry>,
    pub code_blocks: Vec<CodeBlock>,
    pub warnings: Vec<String>,
}

impl RefinedArtifact {
    /// First code block whose filename matches `filename` exactly.
    pub fn code_for(&self, filename: &str) -> Option<&str> {
        self.code_blocks
            .iter()
            .find(|block| block.filename == filename)
            .map(|block| block.content.as_str())
    }

    /// Directory name for the project root: the declared name, or the
    /// sanitized objective when none was declared.
    pub fn project_dir_name(&self, objective: &str) -> String {
        let name = match &self.project_name {
            Some(name) if is_safe_component(name) && !name.starts_with('.') => name.clone(),
            Some(name) => sanitize(name),
            None => sanitize(objective.trim()),
        };
        if name.is_empty() || name.chars().all(|c| c == '_') {
            return FALLBACK_PROJECT_NAME.to_string();
        }
        name
    }
}

/// Parse the refiner's reply. Never fails.
pub fn parse_refined_output(text: &str) -> RefinedArtifact {
    let mut warnings = Vec::new();
    let folder_structure = parse_folder_structure(text, &mut warnings);
    RefinedArtifact {
        project_name: parse_project_name(text),
        folder_structure,
        code_blocks: extract_code_blocks(text),
        warnings,
    }
}

fn parse_project_name(text: &str) -> Option<String> {
    let captures = PROJECT_NAME_RE.captures(text)?;
    let name = captures[1]
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '`' | '"'))
        .to_string();
    (!name.is_empty()).then_some(name)
}

fn parse_folder_structure(text: &str, warnings: &mut Vec<String>) -> BTreeMap<String, FolderEntry> {
    let Some(captures) = FOLDER_STRUCTURE_RE.captures(text) else {
        return BTreeMap::new();
    };
    let raw = strip_code_fence(captures[1].trim());
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| (key, folder_entry(value)))
            .collect(),
        Ok(other) => {
            warnings.push(format!(
                "folder structure must be a JSON object, got {}",
                json_kind(&other)
            ));
            BTreeMap::new()
        }
        Err(err) => {
            warnings.push(format!("invalid folder structure JSON: {err}"));
            BTreeMap::new()
        }
    }
}

fn folder_entry(value: Value) -> FolderEntry {
    match value {
        Value::Object(map) => FolderEntry::Directory(
            map.into_iter()
                .map(|(key, value)| (key, folder_entry(value)))
                .collect(),
        ),
        _ => FolderEntry::File,
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    CODE_BLOCK_RE
        .captures_iter(text)
        .map(|captures| CodeBlock {
            filename: captures[1].to_string(),
            content: captures[2].to_string(),
        })
        .collect()
}
