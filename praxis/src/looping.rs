//! The decomposition loop: orchestrator → sub-agent cycles, then the refiner.

use std::path::PathBuf;

use anyhow::{Error, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agents::{AgentSettings, OrchestratorAgent, RefinerAgent, SubAgent, state_dir};
use crate::core::cancel::CancelToken;
use crate::core::completion::{OrchestratorDecision, classify};
use crate::core::ledger::{complete_task, fail_task, push_task};
use crate::core::types::{AgentContext, Role, Task};
use crate::io::config::PraxisConfig;
use crate::io::generator::{RetriesExhausted, TextGenerator};
use crate::io::workspace_store::WorkspaceScope;

/// Progress reported while a loop runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    Started { run_id: String },
    OrchestratorReplied { iteration: u32, complete: bool },
    TaskStarted { iteration: u32, task: Task },
    TaskCompleted { iteration: u32, task: Task },
    Refined { bytes: usize },
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The orchestrator signalled completion and the refiner answered.
    Complete {
        refined_output: String,
        completion_text: String,
    },
    /// The cancellation token was tripped between iterations.
    Cancelled,
    /// `max_iterations` orchestrator calls went by without completion.
    MaxIterationsExceeded { max_iterations: u32 },
}

impl LoopStop {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStop::Complete { .. } => "complete",
            LoopStop::Cancelled => "cancelled",
            LoopStop::MaxIterationsExceeded { .. } => "incomplete",
        }
    }
}

/// Summary of one loop run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub run_id: String,
    pub context: AgentContext,
    pub orchestrator_calls: u32,
    pub stop: LoopStop,
}

/// An agent call failed and aborted the run.
///
/// Completed tasks are kept in `context` for inspection; the task whose
/// sub-agent call failed is marked failed.
#[derive(Debug, thiserror::Error)]
#[error("{role} agent call failed after {attempts} attempt(s): {message}")]
pub struct AgentCallError {
    pub run_id: String,
    pub role: Role,
    pub attempts: u32,
    pub context: AgentContext,
    pub message: String,
}

/// New run identifier: `run-` plus eight hex digits.
pub fn new_run_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("run-{}", &id[..8])
}

/// Drive the orchestrator and sub-agent until completion, cancellation or the
/// iteration budget runs out. The refiner runs once, only on completion.
///
/// Agent failures stop the run immediately with an [`AgentCallError`].
#[instrument(skip_all, fields(workspace = %scope.title))]
pub fn run_loop<G: TextGenerator + ?Sized, F: FnMut(&LoopEvent)>(
    generator: &G,
    scope: &WorkspaceScope,
    objective: &str,
    config: &PraxisConfig,
    cancel: &CancelToken,
    mut on_event: F,
) -> Result<LoopOutcome> {
    let run_id = new_run_id();
    let state = state_dir(&scope.path);
    let run_dir = state.join("runs").join(&run_id);
    let settings = AgentSettings::from_config(config);
    let orchestrator = OrchestratorAgent::new(&state, settings.clone());
    let sub_agent = SubAgent::new(&state, settings.clone());
    let refiner = RefinerAgent::new(&state, settings);

    let mut context = AgentContext::new(objective);
    info!(run_id = %run_id, max_iterations = config.max_iterations, "starting run");
    on_event(&LoopEvent::Started {
        run_id: run_id.clone(),
    });

    for iteration in 1..=config.max_iterations {
        if cancel.is_cancelled() {
            info!(run_id = %run_id, iteration, "run cancelled");
            return Ok(LoopOutcome {
                run_id,
                context,
                orchestrator_calls: iteration - 1,
                stop: LoopStop::Cancelled,
            });
        }

        let call_dir = iteration_dir(&run_dir, iteration);
        let reply = match orchestrator.run(generator, scope, &context, &call_dir) {
            Ok(reply) => reply,
            Err(err) => return Err(call_failed(&run_id, Role::Orchestrator, context, err)),
        };
        let decision = classify(&reply);
        on_event(&LoopEvent::OrchestratorReplied {
            iteration,
            complete: matches!(decision, OrchestratorDecision::Complete(_)),
        });

        let description = match decision {
            OrchestratorDecision::Complete(completion_text) => {
                info!(run_id = %run_id, iteration, tasks = context.tasks.len(), "orchestrator signalled completion");
                let refined = match refiner.run(generator, scope, &context, &run_dir) {
                    Ok(reply) => reply.text,
                    Err(err) => return Err(call_failed(&run_id, Role::Refiner, context, err)),
                };
                on_event(&LoopEvent::Refined {
                    bytes: refined.len(),
                });
                return Ok(LoopOutcome {
                    run_id,
                    context,
                    orchestrator_calls: iteration,
                    stop: LoopStop::Complete {
                        refined_output: refined,
                        completion_text,
                    },
                });
            }
            OrchestratorDecision::NextTask(description) => description,
        };

        let index = push_task(&mut context, &description);
        on_event(&LoopEvent::TaskStarted {
            iteration,
            task: context.tasks[index].clone(),
        });
        let previous = &context.tasks[..index];
        let result = match sub_agent.run(generator, scope, &context.tasks[index], previous, &call_dir) {
            Ok(reply) => reply.text,
            Err(err) => {
                fail_task(&mut context, index);
                return Err(call_failed(&run_id, Role::SubAgent, context, err));
            }
        };
        complete_task(&mut context, index, result)?;
        on_event(&LoopEvent::TaskCompleted {
            iteration,
            task: context.tasks[index].clone(),
        });
    }

    warn!(run_id = %run_id, max_iterations = config.max_iterations, "iteration budget exhausted");
    Ok(LoopOutcome {
        run_id,
        context,
        orchestrator_calls: config.max_iterations,
        stop: LoopStop::MaxIterationsExceeded {
            max_iterations: config.max_iterations,
        },
    })
}

fn iteration_dir(run_dir: &std::path::Path, iteration: u32) -> PathBuf {
    run_dir.join(format!("{iteration:04}"))
}

fn call_failed(run_id: &str, role: Role, context: AgentContext, err: Error) -> Error {
    let attempts = err
        .downcast_ref::<RetriesExhausted>()
        .map_or(1, |exhausted| exhausted.attempts);
    warn!(run_id = %run_id, role = %role, attempts, err = %format!("{err:#}"), "agent call failed");
    Error::new(AgentCallError {
        run_id: run_id.to_string(),
        role,
        attempts,
        context,
        message: format!("{err:#}"),
    })
}
