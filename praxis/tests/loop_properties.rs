//! Termination properties of the decomposition loop.

use praxis::core::cancel::CancelToken;
use praxis::core::types::{AgentReply, Role, TaskStatus};
use praxis::io::config::PraxisConfig;
use praxis::looping::{LoopStop, run_loop};
use praxis::test_support::{ScriptedGenerator, TestBase, completion_reply};

fn config(max_iterations: u32) -> PraxisConfig {
    PraxisConfig {
        max_iterations,
        ..PraxisConfig::default()
    }
}

/// Verifies that a marker on the Nth orchestrator reply yields exactly N
/// orchestrator calls and N-1 completed tasks, for several N.
#[test]
fn marker_on_nth_call_yields_n_minus_one_tasks() {
    for n in 1..=5u32 {
        let (_base, scope) = TestBase::with_workspace("loop");
        let generator = ScriptedGenerator::new();
        for i in 1..n {
            generator.push_text(Role::Orchestrator, &format!("sub-task {i}"));
        }
        generator.push(Role::Orchestrator, completion_reply("finished"));
        generator.set_fallback(Role::SubAgent, AgentReply::text("done"));
        generator.push_text(Role::Refiner, "final");

        let outcome = run_loop(&generator, &scope, "objective", &config(10), &CancelToken::new(), |_| {})
            .expect("loop");

        assert_eq!(outcome.orchestrator_calls, n);
        assert_eq!(generator.calls(Role::Orchestrator), n as usize);
        assert_eq!(outcome.context.tasks.len(), (n - 1) as usize);
        assert!(
            outcome
                .context
                .tasks
                .iter()
                .all(|task| task.status == TaskStatus::Completed)
        );
        assert_eq!(outcome.context.previous_results.len(), (n - 1) as usize);
        assert!(matches!(outcome.stop, LoopStop::Complete { .. }));
    }
}

#[test]
fn degenerate_orchestrator_stops_at_guard() {
    for max in [1u32, 4, 7] {
        let (_base, scope) = TestBase::with_workspace("loop");
        let generator = ScriptedGenerator::new();
        generator.set_fallback(Role::Orchestrator, AgentReply::text("one more thing"));
        generator.set_fallback(Role::SubAgent, AgentReply::text("ok"));

        let outcome = run_loop(&generator, &scope, "objective", &config(max), &CancelToken::new(), |_| {})
            .expect("loop");

        assert_eq!(
            outcome.stop,
            LoopStop::MaxIterationsExceeded { max_iterations: max }
        );
        assert_eq!(generator.calls(Role::Orchestrator), max as usize);
        assert_eq!(generator.calls(Role::Refiner), 0);
    }
}

#[test]
fn marker_inside_text_is_not_completion() {
    let (_base, scope) = TestBase::with_workspace("loop");
    let generator = ScriptedGenerator::new();
    generator.push_text(
        Role::Orchestrator,
        "Check whether The task is complete: then report",
    );
    generator.push(Role::Orchestrator, completion_reply("yes"));
    generator.push_text(Role::SubAgent, "checked");
    generator.push_text(Role::Refiner, "final");

    let outcome = run_loop(&generator, &scope, "objective", &config(5), &CancelToken::new(), |_| {})
        .expect("loop");
    assert_eq!(outcome.context.tasks.len(), 1);
}
