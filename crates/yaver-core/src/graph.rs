//! `TaskGraph`: the ordered, in-memory store of a session's tasks.
//!
//! Tasks reference each other by id only (never by pointer); lookups go
//! through this type. Creation order is preserved and is the scheduler's
//! tie-breaker.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::task::{Status, Task};

/// Ordered task storage for one session.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<Uuid, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        TaskGraph::default()
    }

    /// Append a task, preserving creation order.
    pub fn push(&mut self, task: Task) {
        self.index.insert(task.id, self.tasks.len());
        self.tasks.push(task);
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.index.get(&id).map(|&i| &self.tasks[i])
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.tasks[i]),
            None => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The root task: the one task with no `parent_task_id`.
    pub fn root(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.parent_task_id.is_none())
    }

    /// Whether `dep_id` names a `COMPLETED` task in this graph.
    fn is_completed(&self, dep_id: Uuid) -> bool {
        self.get(dep_id).is_some_and(|t| t.status == Status::Completed)
    }

    /// Whether every dependency of `task` is `COMPLETED`.
    pub fn dependencies_satisfied(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|&dep| self.is_completed(dep))
    }

    /// Whether any dependency of `task` is `FAILED`.
    pub fn has_failed_dependency(&self, task: &Task) -> bool {
        task.dependencies
            .iter()
            .any(|&dep| self.get(dep).is_some_and(|t| t.status == Status::Failed))
    }

    /// End-of-session presentation pass (§9 resolution): relabel any
    /// still-`PENDING` task with a transitively `FAILED` dependency as
    /// `BLOCKED`. Never run mid-session; never feeds back into scheduling.
    pub fn relabel_abandoned_as_blocked(&mut self) {
        let abandoned: Vec<Uuid> = self
            .tasks
            .iter()
            .filter(|t| t.status == Status::Pending && self.has_failed_dependency(t))
            .map(|t| t.id)
            .collect();
        for id in abandoned {
            if let Some(t) = self.get_mut(id) {
                let _ = crate::state::transition(t, Status::Blocked);
            }
        }
    }
}

/// Errors raised while materialising a `TaskGraph` from a decomposition.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("dependency cycle detected involving tasks: {0}")]
    CycleDetected(String),
}

/// Detect a dependency cycle across the given tasks using Kahn's algorithm,
/// grounded on the teacher's plan-TOML cycle check. Edge direction: a
/// dependency must complete before its dependent, so `dep -> dependent`.
pub fn check_for_cycles(tasks: &[Task]) -> Result<(), GraphError> {
    let id_to_idx: HashMap<Uuid, usize> = tasks.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
    let n = tasks.len();
    let mut in_degree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![vec![]; n];

    for (task_idx, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            if let Some(&dep_idx) = id_to_idx.get(dep) {
                adj[dep_idx].push(task_idx);
                in_degree[task_idx] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted_count = 0usize;
    while let Some(node) = queue.pop_front() {
        sorted_count += 1;
        for &neighbor in &adj[node] {
            in_degree[neighbor] -= 1;
            if in_degree[neighbor] == 0 {
                queue.push_back(neighbor);
            }
        }
    }

    if sorted_count != n {
        let cycle_names: Vec<&str> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(i, _)| tasks[i].title.as_str())
            .collect();
        return Err(GraphError::CycleDetected(cycle_names.join(", ")));
    }

    Ok(())
}

/// Scheduler contract: select the next runnable task.
///
/// Candidates are `PENDING` tasks whose dependencies are all `COMPLETED`.
/// Among candidates, lower `Priority` ordinal wins (CRITICAL first), ties
/// broken by creation order (earlier index wins) -- `Vec::sort_by` is a
/// stable sort so a key of `(priority, index)` is unnecessary, but we sort
/// on priority alone over an already creation-ordered slice, which is
/// exactly a stable sort on `(priority, creation order)`.
pub fn next(graph: &TaskGraph) -> Option<&Task> {
    let mut candidates: Vec<&Task> = graph
        .iter()
        .filter(|t| t.status == Status::Pending && graph.dependencies_satisfied(t))
        .collect();

    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by_key(|t| t.priority);
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;

    fn mk(title: &str, priority: Priority) -> Task {
        Task::new(title, "d", priority)
    }

    #[test]
    fn empty_graph_has_no_next_task() {
        let g = TaskGraph::new();
        assert!(next(&g).is_none());
    }

    #[test]
    fn dependency_chain_emits_in_order() {
        let mut g = TaskGraph::new();
        let a = mk("A", Priority::Medium);
        let a_id = a.id;
        g.push(a);

        let mut b = mk("B", Priority::Medium);
        b.dependencies.push(a_id);
        let b_id = b.id;
        g.push(b);

        let mut c = mk("C", Priority::Medium);
        c.dependencies.push(b_id);
        let c_id = c.id;
        g.push(c);

        let first = next(&g).unwrap().id;
        assert_eq!(first, a_id);

        g.get_mut(a_id).unwrap().status = Status::Completed;
        let second = next(&g).unwrap().id;
        assert_eq!(second, b_id);

        g.get_mut(b_id).unwrap().status = Status::Completed;
        let third = next(&g).unwrap().id;
        assert_eq!(third, c_id);
    }

    #[test]
    fn priority_breaks_ties_by_creation_order() {
        let mut g = TaskGraph::new();
        let first = mk("first", Priority::Medium);
        let first_id = first.id;
        g.push(first);
        let second = mk("second", Priority::Medium);
        g.push(second);

        let chosen = next(&g).unwrap();
        assert_eq!(chosen.id, first_id);
    }

    #[test]
    fn critical_wins_over_high() {
        let mut g = TaskGraph::new();
        g.push(mk("low-prio-but-first", Priority::High));
        let critical = mk("critical", Priority::Critical);
        let critical_id = critical.id;
        g.push(critical);

        let chosen = next(&g).unwrap();
        assert_eq!(chosen.id, critical_id);
    }

    #[test]
    fn cycle_is_detected() {
        let mut a = mk("a", Priority::Medium);
        let mut b = mk("b", Priority::Medium);
        a.dependencies.push(b.id);
        b.dependencies.push(a.id);
        let err = check_for_cycles(&[a, b]).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected(_)));
    }

    #[test]
    fn diamond_dag_is_accepted() {
        let a = mk("a", Priority::Medium);
        let mut b = mk("b", Priority::Medium);
        b.dependencies.push(a.id);
        let mut c = mk("c", Priority::Medium);
        c.dependencies.push(a.id);
        let mut d = mk("d", Priority::Medium);
        d.dependencies.push(b.id);
        d.dependencies.push(c.id);
        assert!(check_for_cycles(&[a, b, c, d]).is_ok());
    }

    #[test]
    fn relabel_abandoned_marks_blocked_not_scheduling() {
        let mut g = TaskGraph::new();
        let mut failed = mk("failed", Priority::Medium);
        failed.status = Status::Failed;
        let failed_id = failed.id;
        g.push(failed);

        let mut dependent = mk("dependent", Priority::Medium);
        dependent.dependencies.push(failed_id);
        let dependent_id = dependent.id;
        g.push(dependent);

        assert!(next(&g).is_none());
        g.relabel_abandoned_as_blocked();
        assert_eq!(g.get(dependent_id).unwrap().status, Status::Blocked);
    }
}
