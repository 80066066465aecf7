//! Per-workspace records: conversation log, run logs and saved chats.
//!
//! - `<ws>/conversation_log.txt`: append-only, one role-tagged line per entry.
//! - `<ws>/logs/<timestamp>_<objective>.md`: one file per objective run.
//! - `<ws>/chats/<timestamp>_<title>.md`: one file per saved chat session.

use std::cmp::Reverse;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::naming::{chat_file_name, parse_timestamped_name, run_log_file_name, sanitize, sequenced_name};
use crate::core::types::AgentContext;
use crate::io::fs_util::{append_line, write_text};
use crate::io::workspace_store::WorkspaceScope;

pub const CONVERSATION_LOG_FILE: &str = "conversation_log.txt";
pub const LOGS_DIR: &str = "logs";
pub const CHATS_DIR: &str = "chats";

/// Speaker of a conversation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Praxis,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Praxis => "Praxis",
        }
    }

    /// `You: <text>` / `Praxis: <text>`.
    pub fn tag(&self, text: &str) -> String {
        format!("{}: {}", self.label(), text)
    }
}

/// One saved chat, as recovered from its file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRecord {
    pub saved_at: NaiveDateTime,
    /// Position among chats saved within the same second, starting at 1.
    pub sequence: u32,
    pub title: String,
    pub file_name: String,
}

pub fn conversation_log_path(scope: &WorkspaceScope) -> PathBuf {
    scope.path.join(CONVERSATION_LOG_FILE)
}

pub fn append_conversation(scope: &WorkspaceScope, speaker: Speaker, text: &str) -> Result<()> {
    append_line(&conversation_log_path(scope), &speaker.tag(text))
}

/// Every line of the conversation log; empty when none was written yet.
pub fn load_conversation(scope: &WorkspaceScope) -> Result<Vec<String>> {
    let path = conversation_log_path(scope);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Markdown body of a run log.
///
/// Pending or failed tasks are listed with their status instead of a result.
pub fn render_run_log(context: &AgentContext, refined_output: Option<&str>) -> String {
    let mut buf = format!("# Objective: {}\n\n", context.objective);
    buf.push_str("## Task Breakdown\n\n");
    for (i, task) in context.tasks.iter().enumerate() {
        buf.push_str(&format!("### Task {}:\n", i + 1));
        buf.push_str(&format!("**Description:** {}\n\n", task.description));
        match &task.result {
            Some(result) => buf.push_str(&format!("**Result:** {result}\n\n")),
            None => buf.push_str(&format!("**Result:** ({})\n\n", task.status.as_str())),
        }
    }
    buf.push_str("## Refined Final Output\n\n");
    match refined_output {
        Some(output) => buf.push_str(output),
        None => buf.push_str("(none: the run did not complete)"),
    }
    buf.push('\n');
    buf
}

/// Write the run log and return its path.
pub fn save_run_log(
    scope: &WorkspaceScope,
    context: &AgentContext,
    refined_output: Option<&str>,
    objective_chars: usize,
) -> Result<PathBuf> {
    let name = run_log_file_name(now(), &context.objective, objective_chars);
    let path = unique_path(&scope.path.join(LOGS_DIR), &name);
    write_text(&path, &render_run_log(context, refined_output))?;
    info!(workspace = %scope.title, path = %path.display(), "saved run log");
    Ok(path)
}

/// Run-log file names, newest first.
pub fn list_run_logs(scope: &WorkspaceScope) -> Result<Vec<String>> {
    let mut names = read_markdown_names(&scope.path.join(LOGS_DIR))?;
    names.sort_by_cached_key(|name| {
        Reverse((
            parse_timestamped_name(name).map(|parsed| parsed.order_key()),
            name.clone(),
        ))
    });
    Ok(names)
}

/// Save a chat transcript and return its path.
pub fn save_chat(scope: &WorkspaceScope, title: &str, content: &str) -> Result<PathBuf> {
    let name = chat_file_name(now(), title);
    let path = unique_path(&scope.path.join(CHATS_DIR), &name);
    write_text(&path, content)?;
    info!(workspace = %scope.title, path = %path.display(), "saved chat");
    Ok(path)
}

/// Saved chats, newest first. Files that do not follow the naming scheme are
/// skipped.
pub fn list_chats(scope: &WorkspaceScope) -> Result<Vec<ChatRecord>> {
    let mut chats = read_markdown_names(&scope.path.join(CHATS_DIR))?
        .into_iter()
        .filter_map(|file_name| {
            let Some(parsed) = parse_timestamped_name(&file_name) else {
                debug!(file = %file_name, "skipping unrecognised chat file");
                return None;
            };
            Some(ChatRecord {
                saved_at: parsed.saved_at,
                sequence: parsed.sequence,
                title: parsed.suffix,
                file_name,
            })
        })
        .collect::<Vec<_>>();
    chats.sort_by(|a, b| {
        (b.saved_at, b.sequence)
            .cmp(&(a.saved_at, a.sequence))
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
    Ok(chats)
}

/// Contents of the newest chat whose title equals `title`.
pub fn load_chat(scope: &WorkspaceScope, title: &str) -> Result<Option<String>> {
    let wanted = sanitize(title);
    let Some(record) = list_chats(scope)?
        .into_iter()
        .find(|record| record.title == wanted || record.title == title)
    else {
        return Ok(None);
    };
    let path = scope.path.join(CHATS_DIR).join(&record.file_name);
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(contents))
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn read_markdown_names(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read directory {}", dir.display())),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read directory {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".md") && entry.path().is_file() {
            names.push(name);
        }
    }
    Ok(names)
}

/// `dir/name`, or the first free sequenced name when saves land in the same
/// second.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    (2..)
        .map(|n| dir.join(sequenced_name(name, n)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::{complete_task, push_task};

    fn scope(root: &Path) -> WorkspaceScope {
        WorkspaceScope {
            title: "demo".to_string(),
            path: root.to_path_buf(),
        }
    }

    #[test]
    fn conversation_log_appends_role_tagged_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        assert!(load_conversation(&scope).expect("empty").is_empty());

        append_conversation(&scope, Speaker::User, "hi").expect("append");
        append_conversation(&scope, Speaker::Praxis, "hello").expect("append");

        assert_eq!(
            load_conversation(&scope).expect("load"),
            vec!["You: hi", "Praxis: hello"]
        );
    }

    #[test]
    fn run_log_lists_tasks_and_refined_output() {
        let mut context = AgentContext::new("Write a hello-world script");
        let idx = push_task(&mut context, "write it");
        complete_task(&mut context, idx, "print('hello')".to_string()).expect("complete");

        let log = render_run_log(&context, Some("final"));
        assert_eq!(
            log,
            "# Objective: Write a hello-world script\n\n## Task Breakdown\n\n### Task 1:\n**Description:** write it\n\n**Result:** print('hello')\n\n## Refined Final Output\n\nfinal\n"
        );
    }

    #[test]
    fn run_log_marks_missing_output() {
        let mut context = AgentContext::new("goal");
        push_task(&mut context, "pending work");
        let log = render_run_log(&context, None);
        assert!(log.contains("**Result:** (pending)"));
        assert!(log.contains("(none: the run did not complete)"));
    }

    #[test]
    fn save_run_log_uses_timestamped_truncated_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        let context = AgentContext::new("Build a very long objective name for testing");

        let path = save_run_log(&scope, &context, Some("out"), 25).expect("save");
        let name = path.file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.ends_with("_Build_a_very_long_objecti.md"), "{name}");
        assert!(parse_timestamped_name(&name).is_some());
        assert_eq!(list_run_logs(&scope).expect("list"), vec![name]);
    }

    #[test]
    fn list_chats_sorts_newest_first_and_skips_foreign_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        let chats = temp.path().join(CHATS_DIR);
        fs::create_dir_all(&chats).expect("mkdir");
        fs::write(chats.join("2024-01-01_10-00-00_old.md"), "old").expect("write");
        fs::write(chats.join("2024-06-01_10-00-00_new.md"), "new").expect("write");
        fs::write(chats.join("notes.md"), "ignored").expect("write");

        let listed = list_chats(&scope).expect("list");
        let titles = listed.iter().map(|c| c.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["new", "old"]);
    }

    #[test]
    fn load_chat_matches_exact_title_newest_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        let chats = temp.path().join(CHATS_DIR);
        fs::create_dir_all(&chats).expect("mkdir");
        fs::write(chats.join("2024-01-01_10-00-00_plan.md"), "first plan").expect("write");
        fs::write(chats.join("2024-02-01_10-00-00_plan.md"), "second plan").expect("write");
        fs::write(chats.join("2024-03-01_10-00-00_planning.md"), "planning").expect("write");

        assert_eq!(
            load_chat(&scope, "plan").expect("load").as_deref(),
            Some("second plan")
        );
        assert_eq!(load_chat(&scope, "pla").expect("load"), None);
    }

    #[test]
    fn same_second_saves_keep_title_and_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        let chats = temp.path().join(CHATS_DIR);
        fs::create_dir_all(&chats).expect("mkdir");
        let first = "2024-01-01_10-00-00_weekly_sync.md";
        fs::write(chats.join(first), "You: hi\n").expect("write");
        let second = unique_path(&chats, first);
        assert_eq!(
            second.file_name().expect("name").to_string_lossy(),
            "2024-01-01_10-00-00-2_weekly_sync.md"
        );
        fs::write(&second, "You: again\n").expect("write");
        let third = unique_path(&chats, first);
        fs::write(&third, "You: third\n").expect("write");

        let listed = list_chats(&scope).expect("list");
        let summary = listed
            .iter()
            .map(|c| (c.title.as_str(), c.sequence))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![("weekly_sync", 3), ("weekly_sync", 2), ("weekly_sync", 1)]
        );
        assert_eq!(
            load_chat(&scope, "weekly sync").expect("load").as_deref(),
            Some("You: third\n")
        );
    }

    #[test]
    fn chat_record_serializes_for_listings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        let chats = temp.path().join(CHATS_DIR);
        fs::create_dir_all(&chats).expect("mkdir");
        fs::write(chats.join("2024-01-01_10-00-00_plan.md"), "plan").expect("write");

        let listed = list_chats(&scope).expect("list");
        let json = serde_json::to_value(&listed).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!([{
                "saved_at": "2024-01-01T10:00:00",
                "sequence": 1,
                "title": "plan",
                "file_name": "2024-01-01_10-00-00_plan.md",
            }])
        );
    }

    #[test]
    fn save_chat_twice_loads_latest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        save_chat(&scope, "weekly sync", "You: hi\n").expect("save");
        save_chat(&scope, "weekly sync", "You: again\n").expect("save twice");

        let listed = list_chats(&scope).expect("list");
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|c| c.title == "weekly_sync"));
        assert_eq!(
            load_chat(&scope, "weekly sync").expect("load").as_deref(),
            Some("You: again\n")
        );
    }

    #[test]
    fn run_logs_in_one_second_list_newest_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scope = scope(temp.path());
        let logs = temp.path().join(LOGS_DIR);
        fs::create_dir_all(&logs).expect("mkdir");
        for name in [
            "2024-01-01_10-00-00_goal.md",
            "2024-01-01_10-00-00-2_goal.md",
            "2024-01-01_09-59-59_goal.md",
        ] {
            fs::write(logs.join(name), "log").expect("write");
        }

        assert_eq!(
            list_run_logs(&scope).expect("list"),
            vec![
                "2024-01-01_10-00-00-2_goal.md",
                "2024-01-01_10-00-00_goal.md",
                "2024-01-01_09-59-59_goal.md",
            ]
        );
    }
}
