//! The `Task` type and its associated enums.
//!
//! Mirrors the status/priority enum style used throughout this codebase:
//! each enum gets a `Display`, a `FromStr` with a dedicated parse-error
//! type, and roundtrip tests.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task's scheduling priority. Lower numeric value wins ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Parse a priority string the way the planner's `priorities` map does:
    /// case-sensitive, one of `critical|high|medium|low`, defaulting to
    /// `Medium` for anything else.
    pub fn from_decomposition_str(s: &str) -> Self {
        match s {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid priority: {0:?} (expected one of critical, high, medium, low)")]
pub struct PriorityParseError(String);

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(PriorityParseError(other.to_string())),
        }
    }
}

/// A task's lifecycle status. See `state::TaskStateMachine` for the valid
/// transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid status: {0:?}")]
pub struct StatusParseError(String);

impl FromStr for Status {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            "blocked" => Ok(Status::Blocked),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// A single forge-sourced comment accumulated on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskComment {
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A well-known metadata value. Recognised keys are documented on the
/// fields below; anything else is opaque and ignored by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Set by the `ReactivePRMonitor` on feedback tasks: skip the branch
    /// creation/PR-intent dance and stay on `pr_branch`.
    #[serde(default)]
    pub skip_branch_creation: bool,
    /// The PR's head branch, present on feedback tasks.
    #[serde(default)]
    pub pr_branch: Option<String>,
    /// Set when the originating comment text matched a conflict keyword.
    #[serde(default)]
    pub is_conflict_resolution: bool,
    /// Marks a task as originating from PR feedback rather than the planner.
    #[serde(default)]
    pub is_pr_feedback: bool,
    /// The forge PR id this feedback task is attached to.
    #[serde(default)]
    pub pr_id: Option<i64>,
    /// The forge comment id that spawned this task.
    #[serde(default)]
    pub originating_comment_id: Option<i64>,
}

/// The unit of work scheduled and executed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub parent_task_id: Option<Uuid>,
    pub subtasks: Vec<Uuid>,
    pub dependencies: Vec<Uuid>,
    pub iteration: Option<u64>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: TaskMetadata,
    pub comments: Vec<TaskComment>,
}

impl Task {
    /// Construct a new task in `Pending` status with no dependencies and
    /// no history. Callers set `priority`, `parent_task_id`, and
    /// `dependencies` afterwards as needed.
    pub fn new(title: impl Into<String>, description: impl Into<String>, priority: Priority) -> Self {
        Task {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            priority,
            status: Status::Pending,
            parent_task_id: None,
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            iteration: None,
            result: None,
            error: None,
            completed_at: None,
            metadata: TaskMetadata::default(),
            comments: Vec::new(),
        }
    }

    /// First 8 hex characters of the task id, used in branch names and logs.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// Comments authored by anyone other than the given agent user name.
    pub fn user_visible_comments(&self, agent_user: &str) -> impl Iterator<Item = &TaskComment> {
        self.comments.iter().filter(move |c| c.author != agent_user)
    }
}

/// Free-form key lookup for metadata recognised via a string map, used only
/// where the original map-of-strings shape is convenient (e.g. deserialized
/// from a decomposition). The typed `TaskMetadata` above is authoritative
/// for engine behaviour.
pub type RawMetadata = HashMap<String, serde_json::Value>;
