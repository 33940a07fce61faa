//! EngineState and the IterationDriver outer loop (§3 EngineState, §4.7).

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::executor::{self, ExecutionResult};
use crate::graph::{self, TaskGraph};
use crate::interfaces::{CodeScanner, ContextRetriever, ForgeClient, Generator, VersionControl};
use crate::planner::{self, PlanContext, PlanError};
use crate::pr_monitor::{self, ActivePr, ReactivePrMonitor};
use crate::side_effects::{self, SideEffectContext};
use crate::state;

/// Configuration governing a single engine session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_iterations: u64,
    pub max_task_depth: u64,
    pub default_base_branch: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_iterations: 50,
            max_task_depth: 3,
            default_base_branch: "main".to_string(),
        }
    }
}

/// A single run's mutable state (§3). Exclusively mutated by the driver.
pub struct EngineState {
    pub user_request: String,
    pub tasks: TaskGraph,
    pub iteration_count: u64,
    pub repo_path: std::path::PathBuf,
    pub plan_context: PlanContext,
    pub active_pr: Option<ActivePr>,
    pub staged_files: Vec<String>,
    pub log: Vec<String>,
    pub errors: Vec<String>,
    pub should_continue: bool,
}

impl EngineState {
    pub fn new(user_request: impl Into<String>, repo_path: std::path::PathBuf) -> Self {
        EngineState {
            user_request: user_request.into(),
            tasks: TaskGraph::new(),
            iteration_count: 0,
            repo_path,
            plan_context: PlanContext::default(),
            active_pr: None,
            staged_files: Vec::new(),
            log: Vec::new(),
            errors: Vec::new(),
            should_continue: true,
        }
    }
}

/// The outcome of running a session to completion.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The plan ran to completion (or abandonment) and any staged files
    /// were committed and pushed.
    Completed,
    /// The iteration budget was exhausted before the plan finished.
    BudgetExceeded,
}

/// External collaborators the driver needs for one session. Grouped to
/// keep `run_session`'s signature manageable, mirroring the teacher's
/// registry-of-collaborators pattern.
pub struct Collaborators<'a> {
    pub generator: &'a dyn Generator,
    pub retriever: &'a dyn ContextRetriever,
    pub scanner: &'a dyn CodeScanner,
    pub vcs: &'a dyn VersionControl,
    pub forge: Option<&'a dyn ForgeClient>,
}

/// Plan the session if no tasks exist yet (§4.7 step 1).
pub async fn ensure_planned(
    state: &mut EngineState,
    config: &EngineConfig,
    generator: &dyn Generator,
) -> Result<(), PlanError> {
    if !state.tasks.is_empty() {
        return Ok(());
    }

    let max_tasks = (config.max_task_depth * 3) as usize;
    let prompt = planner::build_planning_prompt(&state.user_request, &state.plan_context, max_tasks);
    let variables = serde_json::json!({ "user_request": state.user_request, "max_tasks": max_tasks });

    let decomposition = match generator.generate_structured(&prompt, &variables).await {
        Ok(value) => planner::salvage_decomposition(value, &state.user_request, max_tasks),
        Err(e) => {
            warn!(error = %e, "planning failed; falling back to single-task plan");
            crate::planner::TaskDecomposition::fallback(&state.user_request)
        }
    };

    state.tasks = planner::materialize(&decomposition)?;
    Ok(())
}

/// Run one iteration of the driver loop (§4.7 step 2). Returns `false` when
/// the session should terminate after this call.
#[instrument(skip_all, fields(iteration = state.iteration_count))]
pub async fn run_iteration(
    state: &mut EngineState,
    config: &EngineConfig,
    collaborators: &Collaborators<'_>,
    monitor: Option<&ReactivePrMonitor>,
) -> bool {
    if state.iteration_count >= config.max_iterations {
        state.should_continue = false;
        state.log.push("iteration budget exhausted".to_string());
        return false;
    }

    // b. ReactivePRMonitor.
    if let (Some(monitor), Some(forge)) = (monitor, collaborators.forge) {
        if state.active_pr.is_none() {
            if let Ok(branch) = collaborators.vcs.active_branch().await {
                if let Some(pr) = monitor.discover_active_pr(forge, &branch, &config.default_base_branch).await {
                    state.active_pr = Some(pr);
                }
            }
        }
        if let Some(active_pr) = state.active_pr.as_mut() {
            let new_tasks = monitor.poll(forge, active_pr).await;
            for task in new_tasks {
                state.tasks.push(task);
            }
        }
    }

    // c. Scheduler.
    let Some(task_id) = graph::next(&state.tasks).map(|t| t.id) else {
        // d. No runnable task: flush staged work and terminate.
        if !state.staged_files.is_empty() {
            finalize_session(state, collaborators.vcs).await;
        }
        state.should_continue = false;
        return false;
    };

    // e. Transition to IN_PROGRESS.
    let iteration = state.iteration_count;
    {
        let task = state.tasks.get_mut(task_id).expect("scheduled task must exist");
        if let Err(e) = state::start(task, iteration) {
            state.errors.push(e.to_string());
            return false;
        }
    }

    // f. Conflict reproduction, if flagged.
    let is_conflict_resolution = state.tasks.get(task_id).map(|t| t.metadata.is_conflict_resolution).unwrap_or(false);
    if is_conflict_resolution {
        if let Some(active_pr) = &state.active_pr {
            pr_monitor::reproduce_conflict(collaborators.vcs, &active_pr.head_ref, &active_pr.base_ref).await;
        }
    }

    // g. Executor + SideEffectApplier.
    let agent_user = monitor.map(|m| m.agent_user().to_string()).unwrap_or_default();
    let context_str = {
        let task = state.tasks.get(task_id).expect("task exists");
        executor::build_context(task, &state.tasks, &state.plan_context, collaborators.retriever, &state.repo_path, &agent_user).await
    };

    let exec_result: ExecutionResult = {
        let task = state.tasks.get(task_id).expect("task exists");
        executor::execute(task, &context_str, collaborators.generator).await
    };

    let applied_files = {
        let task = state.tasks.get_mut(task_id).expect("task exists");
        let ctx = SideEffectContext {
            repo_path: &state.repo_path,
            generator: collaborators.generator,
            scanner: collaborators.scanner,
            vcs: collaborators.vcs,
            user_request: &state.user_request,
            default_base_branch: &config.default_base_branch,
        };
        side_effects::apply(task, &exec_result, &ctx).await
    };
    state.staged_files.extend(applied_files);

    // h. Transition to terminal state.
    {
        let task = state.tasks.get_mut(task_id).expect("task exists");
        let now = Utc::now();
        if exec_result.success {
            if let Err(e) = state::complete(task, exec_result.output.unwrap_or_default(), now) {
                state.errors.push(e.to_string());
            }
        } else if let Err(e) = state::fail(task, exec_result.error.unwrap_or_default(), now) {
            state.errors.push(e.to_string());
        }
    }

    // i. Bookkeeping.
    state.iteration_count += 1;
    state.log.push(format!("iteration {iteration}: task {task_id} processed"));

    true
}

/// Run the full session loop to completion (§4.7, §4.7.3).
pub async fn run_session(state: &mut EngineState, config: &EngineConfig, collaborators: &Collaborators<'_>, monitor: Option<&ReactivePrMonitor>) -> SessionOutcome {
    loop {
        if !run_iteration(state, config, collaborators, monitor).await {
            break;
        }
    }
    state.tasks.relabel_abandoned_as_blocked();
    if state.iteration_count >= config.max_iterations {
        SessionOutcome::BudgetExceeded
    } else {
        SessionOutcome::Completed
    }
}

/// Termination bundling commit (§4.7 step 3).
async fn finalize_session(state: &mut EngineState, vcs: &dyn VersionControl) {
    let root_title = state.tasks.root().map(|t| t.title.clone()).unwrap_or_else(|| state.user_request.clone());
    let root_short = state.tasks.root().map(|t| t.short_id()).unwrap_or_default();
    let message = format!("feat: {root_title} (Task {root_short})");

    if let Err(e) = vcs.commit(&message).await {
        warn!(error = %e, "commit failed; ending session with staged but uncommitted files");
        return;
    }

    let branch = match vcs.active_branch().await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "could not resolve active branch; push skipped");
            return;
        }
    };
    if let Err(e) = vcs.push("origin", &branch).await {
        warn!(error = %e, "push failed");
        return;
    }
    info!(message = %message, branch = %branch, "bundling commit produced");
}
