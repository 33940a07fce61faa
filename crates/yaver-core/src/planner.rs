//! Planner: turn a user request + context into a [`TaskDecomposition`],
//! then materialise it into a [`TaskGraph`] (§4.1).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::graph::{check_for_cycles, GraphError, TaskGraph};
use crate::task::{Priority, Status, Task};

pub const DECOMPOSITION_PROMPT: &str = "decomposition_prompt";

/// Repository statistics optionally fed into the planning/execution prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoInfo {
    pub repo_path: String,
    pub total_files: u64,
    pub total_lines: u64,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanContext {
    pub repo_info: Option<RepoInfo>,
    pub architecture_type: Option<String>,
    pub memory_context: Option<String>,
}

/// The planner's structured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDecomposition {
    pub main_task: String,
    pub subtasks: Vec<String>,
    pub priorities: HashMap<String, String>,
    pub dependencies: HashMap<String, Vec<String>>,
    pub estimated_complexity: String,
}

impl TaskDecomposition {
    /// The single-subtask fallback used whenever the generator's response
    /// cannot be salvaged into a usable shape.
    pub fn fallback(user_request: &str) -> Self {
        let mut priorities = HashMap::new();
        priorities.insert(user_request.to_string(), "high".to_string());
        TaskDecomposition {
            main_task: user_request.to_string(),
            subtasks: vec![user_request.to_string()],
            priorities,
            dependencies: HashMap::new(),
            estimated_complexity: "unknown".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Build the system prompt handed to the generator, string-builder style.
pub fn build_planning_prompt(user_request: &str, context: &PlanContext, max_tasks: usize) -> String {
    let mut out = String::new();
    out.push_str("Decompose the following request into subtasks.\n\n");
    out.push_str(&format!("Request: {user_request}\n"));
    out.push_str(&format!("Maximum subtasks: {max_tasks}\n"));

    if let Some(repo) = &context.repo_info {
        out.push_str(&format!(
            "\nProject Info:\n- File count: {}\n- Total lines: {}\n- Languages: {:?}\n",
            repo.total_files, repo.total_lines, repo.languages
        ));
    }
    if let Some(arch) = &context.architecture_type {
        out.push_str(&format!("- Architecture: {arch}\n"));
    }
    if let Some(mem) = &context.memory_context {
        if !mem.is_empty() {
            out.push_str(&format!("\n{mem}\n"));
        }
    }
    out
}

/// Robust-parsing policy (§4.1): coerce whatever shape the generator
/// returned into a usable [`TaskDecomposition`], falling back to a
/// single-subtask plan on anything unrecoverable.
pub fn salvage_decomposition(mut value: Value, user_request: &str, max_tasks: usize) -> TaskDecomposition {
    let Some(obj) = value.as_object_mut() else {
        if let Value::Array(items) = value {
            let subtasks: Vec<String> = items.iter().map(value_to_text).collect();
            return finish(
                user_request.to_string(),
                subtasks,
                HashMap::new(),
                HashMap::new(),
                "medium".to_string(),
                max_tasks,
            );
        }
        warn!("decomposition response had an unsalvageable shape; falling back to single-task plan");
        return TaskDecomposition::fallback(user_request);
    };

    // `tasks` in place of `subtasks`.
    if obj.contains_key("tasks") && !obj.contains_key("subtasks") {
        if let Some(Value::Array(items)) = obj.get("tasks") {
            let subtasks: Vec<String> = items.iter().map(value_to_title_or_text).collect();
            obj.insert("subtasks".to_string(), Value::Array(subtasks.into_iter().map(Value::String).collect()));
        }
    }

    // Single task object as the whole response.
    if obj.contains_key("title") && !obj.contains_key("subtasks") {
        let title = obj.get("title").map(value_to_text).unwrap_or_default();
        obj.insert("subtasks".to_string(), Value::Array(vec![Value::String(title.clone())]));
        if obj.contains_key("description") && !obj.contains_key("main_task") {
            let desc = obj.get("description").map(value_to_text).unwrap_or_default();
            obj.insert("main_task".to_string(), Value::String(desc));
        }
    }

    let main_task = obj
        .get("main_task")
        .map(value_to_text)
        .unwrap_or_else(|| user_request.to_string());

    let subtasks: Vec<String> = match obj.get("subtasks") {
        Some(Value::Array(items)) => items.iter().map(value_to_text).collect(),
        _ => vec![main_task.clone()],
    };

    let priorities: HashMap<String, String> = match obj.get("priorities") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_text(v)))
            .collect(),
        _ => subtasks.iter().map(|s| (s.clone(), "medium".to_string())).collect(),
    };

    let dependencies: HashMap<String, Vec<String>> = match obj.get("dependencies") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                let deps = match v {
                    Value::Array(items) => items.iter().map(value_to_text).collect(),
                    _ => Vec::new(),
                };
                (k.clone(), deps)
            })
            .collect(),
        _ => HashMap::new(),
    };

    let estimated_complexity = obj
        .get("estimated_complexity")
        .map(value_to_text)
        .unwrap_or_else(|| "medium".to_string());

    finish(main_task, subtasks, priorities, dependencies, estimated_complexity, max_tasks)
}

fn finish(
    main_task: String,
    mut subtasks: Vec<String>,
    mut priorities: HashMap<String, String>,
    dependencies: HashMap<String, Vec<String>>,
    estimated_complexity: String,
    max_tasks: usize,
) -> TaskDecomposition {
    if subtasks.is_empty() {
        subtasks.push(main_task.clone());
    }
    if subtasks.len() > max_tasks {
        let dropped = subtasks.len() - max_tasks;
        warn!(dropped, "planner subtask cap exceeded; truncating");
        subtasks.truncate(max_tasks);
    }
    for s in &subtasks {
        priorities.entry(s.clone()).or_insert_with(|| "medium".to_string());
    }
    TaskDecomposition {
        main_task,
        subtasks,
        priorities,
        dependencies,
        estimated_complexity,
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_title_or_text(v: &Value) -> String {
    if let Value::Object(map) = v {
        if let Some(Value::String(title)) = map.get("title") {
            return title.clone();
        }
    }
    value_to_text(v)
}

/// Materialise a [`TaskDecomposition`] into a [`TaskGraph`] (§4.1).
///
/// Title truncation: root to 100 chars of `main_task`; each subtask to
/// `"Subtask {n}: "` + 80 chars of its description. Dependencies resolve
/// by exact subtask-text lookup; unresolved names are silently dropped.
pub fn materialize(decomposition: &TaskDecomposition) -> Result<TaskGraph, PlanError> {
    let mut graph = TaskGraph::new();

    let mut root = Task::new(
        truncate_chars(&decomposition.main_task, 100),
        decomposition.main_task.clone(),
        Priority::High,
    );
    root.status = Status::InProgress;
    let root_id = root.id;

    let mut subtask_ids: HashMap<String, uuid::Uuid> = HashMap::new();
    let mut subtasks = Vec::with_capacity(decomposition.subtasks.len());

    for (i, desc) in decomposition.subtasks.iter().enumerate() {
        let priority_str = decomposition
            .priorities
            .get(desc)
            .map(String::as_str)
            .unwrap_or("medium");
        let priority = Priority::from_decomposition_str(priority_str);

        let mut task = Task::new(
            format!("Subtask {}: {}", i + 1, truncate_chars(desc, 80)),
            desc.clone(),
            priority,
        );
        task.parent_task_id = Some(root_id);
        subtask_ids.insert(desc.clone(), task.id);
        subtasks.push(task);
    }

    for (desc, deps) in &decomposition.dependencies {
        if let Some(&task_id) = subtask_ids.get(desc) {
            if let Some(task) = subtasks.iter_mut().find(|t| t.id == task_id) {
                task.dependencies = deps.iter().filter_map(|d| subtask_ids.get(d).copied()).collect();
            }
        }
    }

    root.subtasks = subtasks.iter().map(|t| t.id).collect();

    // Defensive cycle check (§3 invariant 2) before anything reaches the graph.
    let mut all_for_check = subtasks.clone();
    all_for_check.push(root.clone());
    check_for_cycles(&all_for_check)?;

    graph.push(root);
    for task in subtasks {
        graph.push(task);
    }

    Ok(graph)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_object() {
        let v = json!({
            "main_task": "Add login",
            "subtasks": ["Write form", "Wire backend"],
            "priorities": {"Write form": "high"},
            "dependencies": {},
            "estimated_complexity": "medium"
        });
        let d = salvage_decomposition(v, "add login", 9);
        assert_eq!(d.main_task, "Add login");
        assert_eq!(d.subtasks.len(), 2);
        assert_eq!(d.priorities.get("Write form"), Some(&"high".to_string()));
    }

    #[test]
    fn flattens_tasks_array_into_subtasks() {
        let v = json!({"tasks": [{"title": "one"}, "two"]});
        let d = salvage_decomposition(v, "req", 9);
        assert_eq!(d.subtasks, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(d.main_task, "req");
    }

    #[test]
    fn single_task_object_becomes_one_element_subtask_list() {
        let v = json!({"title": "Fix bug", "description": "the full description"});
        let d = salvage_decomposition(v, "req", 9);
        assert_eq!(d.subtasks, vec!["Fix bug".to_string()]);
        assert_eq!(d.main_task, "the full description");
    }

    #[test]
    fn bare_list_uses_user_request_as_main_task() {
        let v = json!(["do a", "do b"]);
        let d = salvage_decomposition(v, "the original request", 9);
        assert_eq!(d.main_task, "the original request");
        assert_eq!(d.subtasks.len(), 2);
    }

    #[test]
    fn empty_object_defaults_everything() {
        let v = json!({});
        let d = salvage_decomposition(v, "noop", 9);
        assert_eq!(d.main_task, "noop");
        assert_eq!(d.subtasks, vec!["noop".to_string()]);
        assert_eq!(d.estimated_complexity, "medium");
    }

    #[test]
    fn fallback_law_holds() {
        let d = TaskDecomposition::fallback("do the thing");
        assert_eq!(d.main_task, "do the thing");
        assert_eq!(d.subtasks, vec!["do the thing".to_string()]);
    }

    #[test]
    fn subtask_cap_is_enforced() {
        let many: Vec<String> = (0..20).map(|i| format!("task {i}")).collect();
        let v = json!({"main_task": "big", "subtasks": many});
        let d = salvage_decomposition(v, "big", 9);
        assert_eq!(d.subtasks.len(), 9);
    }

    #[test]
    fn materialize_builds_root_and_subtasks_with_dependencies() {
        let mut deps = HashMap::new();
        deps.insert("b".to_string(), vec!["a".to_string()]);
        let d = TaskDecomposition {
            main_task: "root".to_string(),
            subtasks: vec!["a".to_string(), "b".to_string()],
            priorities: HashMap::new(),
            dependencies: deps,
            estimated_complexity: "medium".to_string(),
        };
        let graph = materialize(&d).unwrap();
        assert_eq!(graph.len(), 3);
        let root = graph.root().unwrap();
        assert_eq!(root.subtasks.len(), 2);
        let b = graph.iter().find(|t| t.description == "b").unwrap();
        assert_eq!(b.dependencies.len(), 1);
    }

    #[test]
    fn materialize_drops_unresolved_dependency_names_silently() {
        let mut deps = HashMap::new();
        deps.insert("a".to_string(), vec!["nonexistent".to_string()]);
        let d = TaskDecomposition {
            main_task: "root".to_string(),
            subtasks: vec!["a".to_string()],
            priorities: HashMap::new(),
            dependencies: deps,
            estimated_complexity: "medium".to_string(),
        };
        let graph = materialize(&d).unwrap();
        let a = graph.iter().find(|t| t.description == "a").unwrap();
        assert!(a.dependencies.is_empty());
    }

    #[test]
    fn materialize_rejects_cyclic_dependencies() {
        let mut deps = HashMap::new();
        deps.insert("a".to_string(), vec!["b".to_string()]);
        deps.insert("b".to_string(), vec!["a".to_string()]);
        let d = TaskDecomposition {
            main_task: "root".to_string(),
            subtasks: vec!["a".to_string(), "b".to_string()],
            priorities: HashMap::new(),
            dependencies: deps,
            estimated_complexity: "medium".to_string(),
        };
        let err = materialize(&d).unwrap_err();
        assert!(matches!(err, PlanError::Graph(GraphError::CycleDetected(_))));
    }
}
