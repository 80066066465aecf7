//! Task ledger operations over an [`AgentContext`].
//!
//! Tasks are appended in proposal order, mutated exactly once when the
//! sub-agent answers, and never removed within a run.

use anyhow::{Result, anyhow};
use uuid::Uuid;

use super::types::{AgentContext, Task, TaskStatus};

/// Allocate a fresh pending task with a unique id.
pub fn create_task(description: &str) -> Task {
    Task {
        id: Uuid::new_v4().to_string(),
        description: description.to_string(),
        status: TaskStatus::Pending,
        result: None,
    }
}

/// Append a new pending task and return its index in the ledger.
pub fn push_task(context: &mut AgentContext, description: &str) -> usize {
    context.tasks.push(create_task(description));
    context.tasks.len() - 1
}

/// Mark the task at `index` completed and mirror its result into
/// `previous_results`.
pub fn complete_task(context: &mut AgentContext, index: usize, result: String) -> Result<()> {
    let task = context
        .tasks
        .get_mut(index)
        .ok_or_else(|| anyhow!("no task at index {index}"))?;
    if task.status != TaskStatus::Pending {
        return Err(anyhow!(
            "task {} already {}",
            task.id,
            task.status.as_str()
        ));
    }
    task.status = TaskStatus::Completed;
    task.result = Some(result.clone());
    context.previous_results.push(result);
    Ok(())
}

/// Mark the task at `index` failed. The result stays absent.
pub fn fail_task(context: &mut AgentContext, index: usize) {
    if let Some(task) = context.tasks.get_mut(index)
        && task.status == TaskStatus::Pending
    {
        task.status = TaskStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_tasks_have_unique_ids_and_start_pending() {
        let a = create_task("a");
        let b = create_task("a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, TaskStatus::Pending);
        assert!(a.result.is_none());
    }

    #[test]
    fn complete_task_mirrors_result() {
        let mut context = AgentContext::new("goal");
        let first = push_task(&mut context, "first");
        let second = push_task(&mut context, "second");
        complete_task(&mut context, first, "one".to_string()).expect("complete first");
        complete_task(&mut context, second, "two".to_string()).expect("complete second");

        assert_eq!(context.previous_results, vec!["one", "two"]);
        assert_eq!(context.tasks[1].result.as_deref(), Some("two"));
        assert_eq!(context.tasks[1].status, TaskStatus::Completed);
    }

    #[test]
    fn complete_task_rejects_second_mutation() {
        let mut context = AgentContext::new("goal");
        let idx = push_task(&mut context, "only");
        complete_task(&mut context, idx, "r".to_string()).expect("complete");
        let err = complete_task(&mut context, idx, "again".to_string()).unwrap_err();
        assert!(err.to_string().contains("already completed"));
        assert_eq!(context.previous_results.len(), 1);
    }

    #[test]
    fn fail_task_leaves_completed_tasks_alone() {
        let mut context = AgentContext::new("goal");
        let done = push_task(&mut context, "done");
        complete_task(&mut context, done, "r".to_string()).expect("complete");
        let pending = push_task(&mut context, "pending");

        fail_task(&mut context, done);
        fail_task(&mut context, pending);

        assert_eq!(context.tasks[done].status, TaskStatus::Completed);
        assert_eq!(context.tasks[pending].status, TaskStatus::Failed);
    }
}
