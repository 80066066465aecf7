//! One objective run: the loop, materialization of the refined output and the
//! run log.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::artifact::parse_refined_output;
use crate::core::cancel::CancelToken;
use crate::core::types::{AgentContext, Task};
use crate::io::config::PraxisConfig;
use crate::io::generator::TextGenerator;
use crate::io::materialize::{MaterializeReport, materialize};
use crate::io::records::{Speaker, append_conversation, save_run_log};
use crate::io::workspace_store::WorkspaceScope;
use crate::looping::{AgentCallError, LoopEvent, LoopStop, run_loop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Incomplete,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Complete => "complete",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Result of a finished objective run.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveReport {
    pub run_id: String,
    pub objective: String,
    pub status: RunStatus,
    pub tasks: Vec<Task>,
    pub refined_output: Option<String>,
    pub materialized: Option<MaterializeReport>,
    pub log_path: Option<PathBuf>,
    /// Non-fatal failures (materialization, run log, conversation log).
    pub problems: Vec<String>,
}

/// Run `objective` in `scope` and persist its artifacts.
///
/// Materialization only happens on completion. The run log is written for
/// every outcome, including agent failures, whose error is returned after the
/// partial log is saved.
pub fn run_objective<G: TextGenerator + ?Sized, F: FnMut(&LoopEvent)>(
    generator: &G,
    scope: &WorkspaceScope,
    objective: &str,
    config: &PraxisConfig,
    cancel: &CancelToken,
    on_event: F,
) -> Result<ObjectiveReport> {
    let mut problems = Vec::new();
    let outcome = match run_loop(generator, scope, objective, config, cancel, on_event) {
        Ok(outcome) => outcome,
        Err(err) => {
            let Some(failure) = err.downcast_ref::<AgentCallError>() else {
                return Err(err);
            };
            let log_path = persist(scope, &failure.context, None, config, "failed", &mut problems);
            return Err(match log_path {
                Some(path) => err.context(format!("objective run failed (partial run log: {})", path.display())),
                None => err,
            });
        }
    };

    let (status, refined_output, materialized) = match &outcome.stop {
        LoopStop::Complete { refined_output, .. } => {
            let artifact = parse_refined_output(refined_output);
            let report = match materialize(&scope.path, objective, &artifact) {
                Ok(report) => {
                    info!(
                        project = %report.project_root.display(),
                        files = report.files.len(),
                        warnings = report.warnings.len(),
                        "materialized refined output"
                    );
                    Some(report)
                }
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "materialization failed");
                    problems.push(format!("materialization failed: {err:#}"));
                    None
                }
            };
            (RunStatus::Complete, Some(refined_output.clone()), report)
        }
        LoopStop::MaxIterationsExceeded { .. } => (RunStatus::Incomplete, None, None),
        LoopStop::Cancelled => (RunStatus::Cancelled, None, None),
    };

    let log_path = persist(
        scope,
        &outcome.context,
        refined_output.as_deref(),
        config,
        outcome.stop.as_str(),
        &mut problems,
    );

    Ok(ObjectiveReport {
        run_id: outcome.run_id,
        objective: objective.to_string(),
        status,
        tasks: outcome.context.tasks,
        refined_output,
        materialized,
        log_path,
        problems,
    })
}

/// Write the run log and a conversation summary; failures are only recorded.
fn persist(
    scope: &WorkspaceScope,
    context: &AgentContext,
    refined_output: Option<&str>,
    config: &PraxisConfig,
    status: &str,
    problems: &mut Vec<String>,
) -> Option<PathBuf> {
    let log_path = match save_run_log(scope, context, refined_output, config.log_objective_chars) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "could not save run log");
            problems.push(format!("run log not saved: {err:#}"));
            None
        }
    };

    let summary = format!(
        "Objective {status} after {} task(s).",
        context.completed_tasks()
    );
    let appended = append_conversation(scope, Speaker::User, &context.objective)
        .and_then(|()| append_conversation(scope, Speaker::Praxis, &summary));
    if let Err(err) = appended {
        warn!(err = %format!("{err:#}"), "could not append conversation log");
        problems.push(format!("conversation log not updated: {err:#}"));
    }
    log_path
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::{Role, TaskStatus};
    use crate::io::records::{LOGS_DIR, load_conversation};
    use crate::test_support::{ScriptedGenerator, TestBase, completion_reply, single_file_refinement};

    #[test]
    fn complete_run_materializes_and_logs() {
        let (base, scope) = TestBase::with_workspace("demo");
        let generator = ScriptedGenerator::new();
        generator.push_text(Role::Orchestrator, "write main");
        generator.push(Role::Orchestrator, completion_reply("done"));
        generator.push_text(Role::SubAgent, "fn main() {}");
        generator.push_text(
            Role::Refiner,
            &single_file_refinement("Demo", "main.rs", "fn main() {}"),
        );

        let report = run_objective(&generator, &scope, "build it", &base.config, &CancelToken::new(), |_| {})
            .expect("run");

        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(
            fs::read_to_string(scope.path.join("Demo/main.rs")).expect("read"),
            "fn main() {}"
        );
        let log = fs::read_to_string(report.log_path.expect("log path")).expect("log");
        assert!(log.contains("# Objective: build it"));
        assert!(report.problems.is_empty());
        assert_eq!(
            load_conversation(&scope).expect("conversation"),
            vec!["You: build it", "Praxis: Objective complete after 1 task(s)."]
        );
    }

    #[test]
    fn incomplete_run_still_writes_log() {
        let (mut base, scope) = TestBase::with_workspace("demo");
        base.config.max_iterations = 2;
        let generator = ScriptedGenerator::new();
        generator.set_fallback(Role::Orchestrator, crate::core::types::AgentReply::text("more"));
        generator.set_fallback(Role::SubAgent, crate::core::types::AgentReply::text("partial"));

        let report = run_objective(&generator, &scope, "endless", &base.config, &CancelToken::new(), |_| {})
            .expect("run");

        assert_eq!(report.status, RunStatus::Incomplete);
        assert!(report.materialized.is_none());
        let log = fs::read_to_string(report.log_path.expect("log path")).expect("log");
        assert!(log.contains("(none: the run did not complete)"));
    }

    #[test]
    fn failed_run_keeps_partial_log() {
        let (base, scope) = TestBase::with_workspace("demo");
        let generator = ScriptedGenerator::new();
        generator.push_text(Role::Orchestrator, "first");
        generator.push_text(Role::SubAgent, "first result");
        generator.push_error(Role::Orchestrator, "quota exceeded");

        let err = run_objective(&generator, &scope, "fragile", &base.config, &CancelToken::new(), |_| {})
            .unwrap_err();
        let failure = err.downcast_ref::<AgentCallError>().expect("typed error");
        assert_eq!(failure.context.tasks[0].status, TaskStatus::Completed);
        assert!(format!("{err:#}").contains("quota exceeded"));

        let logs = fs::read_dir(scope.path.join(LOGS_DIR)).expect("logs").count();
        assert_eq!(logs, 1);
    }
}
