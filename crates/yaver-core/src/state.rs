//! Task status transitions.
//!
//! The engine has no database, so there is no optimistic-locking row
//! update to perform; a transition is just a validated mutation of an
//! in-memory `Task`. The validity graph mirrors the one the distributed
//! teacher system enforced via `WHERE status = $from`.

use thiserror::Error;

use crate::task::{Status, Task};

#[derive(Debug, Error)]
#[error("invalid transition for task {task_id}: {from} -> {to}")]
pub struct TransitionError {
    pub task_id: String,
    pub from: Status,
    pub to: Status,
}

/// Whether `to` is a legal next status from `from`.
///
/// PENDING -> IN_PROGRESS -> {COMPLETED, FAILED}. BLOCKED is reachable only
/// from PENDING, and only as an end-of-session presentation relabelling
/// (§9 open-question resolution) -- it is never a live scheduling state.
pub fn is_valid_transition(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Pending, InProgress) | (InProgress, Completed) | (InProgress, Failed) | (Pending, Blocked)
    )
}

/// Apply a validated transition, mutating `task.status` in place.
pub fn transition(task: &mut Task, to: Status) -> Result<(), TransitionError> {
    if !is_valid_transition(task.status, to) {
        return Err(TransitionError {
            task_id: task.id.to_string(),
            from: task.status,
            to,
        });
    }
    task.status = to;
    Ok(())
}

/// Transition `task` to `IN_PROGRESS`, assigning `iteration` exactly once
/// (invariant 4).
pub fn start(task: &mut Task, iteration: u64) -> Result<(), TransitionError> {
    transition(task, Status::InProgress)?;
    task.iteration = Some(iteration);
    Ok(())
}

/// Transition `task` to `COMPLETED`, carrying the generator's output.
pub fn complete(task: &mut Task, result: String, completed_at: chrono::DateTime<chrono::Utc>) -> Result<(), TransitionError> {
    transition(task, Status::Completed)?;
    task.result = Some(result);
    task.completed_at = Some(completed_at);
    Ok(())
}

/// Transition `task` to `FAILED`, carrying the error message.
pub fn fail(task: &mut Task, error: String, completed_at: chrono::DateTime<chrono::Utc>) -> Result<(), TransitionError> {
    transition(task, Status::Failed)?;
    task.error = Some(error);
    task.completed_at = Some(completed_at);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;

    #[test]
    fn valid_edges() {
        assert!(is_valid_transition(Status::Pending, Status::InProgress));
        assert!(is_valid_transition(Status::InProgress, Status::Completed));
        assert!(is_valid_transition(Status::InProgress, Status::Failed));
        assert!(is_valid_transition(Status::Pending, Status::Blocked));
    }

    #[test]
    fn invalid_edges() {
        assert!(!is_valid_transition(Status::Completed, Status::Pending));
        assert!(!is_valid_transition(Status::Failed, Status::InProgress));
        assert!(!is_valid_transition(Status::Pending, Status::Completed));
        assert!(!is_valid_transition(Status::Blocked, Status::InProgress));
    }

    #[test]
    fn start_assigns_iteration_once() {
        let mut t = Task::new("t", "d", Priority::Medium);
        start(&mut t, 3).unwrap();
        assert_eq!(t.status, Status::InProgress);
        assert_eq!(t.iteration, Some(3));
    }

    #[test]
    fn complete_requires_in_progress() {
        let mut t = Task::new("t", "d", Priority::Medium);
        let err = complete(&mut t, "out".into(), chrono::Utc::now()).unwrap_err();
        assert_eq!(err.from, Status::Pending);
        assert_eq!(err.to, Status::Completed);
    }

    #[test]
    fn fail_carries_error_message() {
        let mut t = Task::new("t", "d", Priority::Medium);
        start(&mut t, 0).unwrap();
        fail(&mut t, "boom".into(), chrono::Utc::now()).unwrap();
        assert_eq!(t.status, Status::Failed);
        assert_eq!(t.error.as_deref(), Some("boom"));
    }
}
