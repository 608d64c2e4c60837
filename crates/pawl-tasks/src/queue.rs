//! Insertion-ordered task queue with dependency tracking.
//!
//! The queue is advisory: it reports which tasks are runnable, it does not
//! enforce anything. Tasks are never removed, only marked completed, so
//! insertion order is stable for the life of a session.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use pawl_core::{PawlError, Result, Task, TaskStatus};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Work queue for one session.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    tasks: Vec<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Rebuilds a queue from a persisted snapshot.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Adds a task. Ids are unique for the life of the queue.
    pub fn add(&mut self, task: Task) -> Result<()> {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(PawlError::DuplicateTask(task.id));
        }
        tracing::debug!(task = %task.id, subject = %task.subject, "task added");
        self.tasks.push(task);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Sets a task's status. Completing a task stamps `completed_at`;
    /// nothing cascades, the orchestrator re-evaluates runnability each
    /// iteration.
    pub fn update_status(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PawlError::UnknownTask(id.to_string()))?;
        task.status = status;
        if status == TaskStatus::Completed && task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        }
        tracing::debug!(task = %id, status = %status, "task status updated");
        Ok(())
    }

    /// Pending tasks whose every `blocked_by` id is completed, ordered by
    /// priority then insertion order.
    pub fn next_runnable(&self) -> Vec<&Task> {
        let completed: HashSet<&str> = self
            .tasks
            .iter()
            .filter(|t| t.is_completed())
            .map(|t| t.id.as_str())
            .collect();

        let mut runnable: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.blocked_by.iter().all(|dep| completed.contains(dep.as_str())))
            .collect();
        // Stable sort keeps insertion order within a priority band.
        runnable.sort_by_key(|t| t.priority);
        runnable
    }

    /// Checks the dependency graph for planning errors: a dependency on an
    /// id that does not exist, or a cycle in `blocked_by` edges. A task
    /// blocked by a nonexistent id would be permanently unrunnable, so both
    /// cases are surfaced instead of auto-healed.
    pub fn validate(&self) -> Result<()> {
        let ids: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
        for task in &self.tasks {
            for dep in &task.blocked_by {
                if !ids.contains(dep.as_str()) {
                    return Err(PawlError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<()> {
        let index: HashMap<&str, &Task> =
            self.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut marks: HashMap<&str, Mark> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), Mark::White))
            .collect();
        let mut path: Vec<&str> = Vec::new();

        for task in &self.tasks {
            if marks.get(task.id.as_str()).copied() == Some(Mark::White) {
                visit(task.id.as_str(), &index, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    /// True when every task is completed; vacuously true for an empty
    /// queue.
    pub fn all_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.is_completed())
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn completed_count(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn remaining_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_completed()).count()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Depth-first walk over `blocked_by` edges with three-color marking.
/// A gray dependency closes a cycle; the error carries the path.
fn visit<'a>(
    id: &'a str,
    index: &HashMap<&'a str, &'a Task>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Result<()> {
    marks.insert(id, Mark::Gray);
    path.push(id);

    if let Some(task) = index.get(id) {
        for dep in &task.blocked_by {
            match marks.get(dep.as_str()).copied() {
                Some(Mark::Gray) => {
                    let start = path
                        .iter()
                        .position(|p| *p == dep.as_str())
                        .unwrap_or(0);
                    let mut cycle: Vec<&str> = path[start..].to_vec();
                    cycle.push(dep.as_str());
                    return Err(PawlError::DependencyCycle(cycle.join(" -> ")));
                }
                Some(Mark::White) => visit(dep.as_str(), index, marks, path)?,
                // Black is already explored; unknown ids were rejected
                // before the cycle walk.
                _ => {}
            }
        }
    }

    path.pop();
    marks.insert(id, Mark::Black);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawl_core::Priority;

    #[test]
    fn test_add_and_get() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("t1", "first")).unwrap();
        assert_eq!(queue.get("t1").unwrap().subject, "first");
        assert!(queue.get("t9").is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("t1", "first")).unwrap();
        let err = queue.add(Task::new("t1", "again")).unwrap_err();
        assert!(matches!(err, PawlError::DuplicateTask(_)));
        assert!(err.is_misuse());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_update_status_unknown_task() {
        let mut queue = TaskQueue::new();
        let err = queue
            .update_status("ghost", TaskStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, PawlError::UnknownTask(_)));
    }

    #[test]
    fn test_completion_stamps_timestamp() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("t1", "first")).unwrap();
        assert!(queue.get("t1").unwrap().completed_at.is_none());
        queue.update_status("t1", TaskStatus::Completed).unwrap();
        assert!(queue.get("t1").unwrap().completed_at.is_some());
    }

    #[test]
    fn test_next_runnable_respects_dependencies() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("t1", "base")).unwrap();
        queue
            .add(Task::new("t2", "dependent").with_dependency("t1"))
            .unwrap();

        let runnable: Vec<&str> = queue.next_runnable().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(runnable, vec!["t1"]);

        queue.update_status("t1", TaskStatus::Completed).unwrap();
        let runnable: Vec<&str> = queue.next_runnable().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(runnable, vec!["t2"]);
    }

    #[test]
    fn test_next_runnable_orders_by_priority_then_insertion() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("a", "medium one")).unwrap();
        queue
            .add(Task::new("b", "urgent").with_priority(Priority::Critical))
            .unwrap();
        queue.add(Task::new("c", "medium two")).unwrap();

        let runnable: Vec<&str> = queue.next_runnable().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(runnable, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_next_runnable_skips_non_pending() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("t1", "working")).unwrap();
        queue.add(Task::new("t2", "parked")).unwrap();
        queue.update_status("t1", TaskStatus::InProgress).unwrap();
        queue.update_status("t2", TaskStatus::Blocked).unwrap();
        assert!(queue.next_runnable().is_empty());
    }

    #[test]
    fn test_validate_reports_dangling_dependency() {
        let mut queue = TaskQueue::new();
        queue
            .add(Task::new("t1", "dependent").with_dependency("missing"))
            .unwrap();
        let err = queue.validate().unwrap_err();
        match err {
            PawlError::UnknownDependency { task, dependency } => {
                assert_eq!(task, "t1");
                assert_eq!(dependency, "missing");
            }
            other => panic!("expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("a", "a").with_dependency("b")).unwrap();
        queue.add(Task::new("b", "b").with_dependency("c")).unwrap();
        queue.add(Task::new("c", "c").with_dependency("a")).unwrap();

        let err = queue.validate().unwrap_err();
        match err {
            PawlError::DependencyCycle(path) => {
                assert!(path.contains("a"), "path was {}", path);
                assert!(path.contains("->"), "path was {}", path);
            }
            other => panic!("expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_detects_self_cycle() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("a", "a").with_dependency("a")).unwrap();
        assert!(matches!(
            queue.validate().unwrap_err(),
            PawlError::DependencyCycle(_)
        ));
    }

    #[test]
    fn test_validate_accepts_dag() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("a", "a")).unwrap();
        queue.add(Task::new("b", "b").with_dependency("a")).unwrap();
        queue
            .add(Task::new("c", "c").with_dependency("a").with_dependency("b"))
            .unwrap();
        assert!(queue.validate().is_ok());
    }

    #[test]
    fn test_counts_and_completion() {
        let mut queue = TaskQueue::new();
        assert!(queue.all_complete());

        queue.add(Task::new("t1", "one")).unwrap();
        queue.add(Task::new("t2", "two")).unwrap();
        assert!(!queue.all_complete());
        assert_eq!(queue.remaining_count(), 2);

        queue.update_status("t1", TaskStatus::Completed).unwrap();
        assert_eq!(queue.completed_count(), 1);
        assert_eq!(queue.remaining_count(), 1);

        queue.update_status("t2", TaskStatus::Completed).unwrap();
        assert!(queue.all_complete());
    }

    #[test]
    fn test_from_tasks_restores_snapshot() {
        let mut queue = TaskQueue::new();
        queue.add(Task::new("t1", "one")).unwrap();
        queue.update_status("t1", TaskStatus::Completed).unwrap();
        queue.add(Task::new("t2", "two")).unwrap();

        let restored = TaskQueue::from_tasks(queue.tasks().to_vec());
        assert_eq!(restored.completed_count(), 1);
        let runnable: Vec<&str> = restored
            .next_runnable()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(runnable, vec!["t2"]);
    }
}
