//! Executor: builds prompt context and invokes the [`Generator`] (§4.4).
//!
//! Does not write files -- that is [`crate::side_effects`]'s job.

use std::path::Path;

use serde_json::json;
use tracing::{error, instrument};

use crate::graph::TaskGraph;
use crate::interfaces::Generator;
use crate::planner::PlanContext;
use crate::task::Task;

pub const TASK_SOLVER_PROMPT: &str = "task_solver_prompt";

/// Outcome of executing a single task.
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Build the deterministic context string handed to the generator (§4.4,
/// steps 1-6).
pub async fn build_context(
    task: &Task,
    graph: &TaskGraph,
    plan_context: &PlanContext,
    retriever: &dyn crate::interfaces::ContextRetriever,
    repo_path: &Path,
    agent_user: &str,
) -> String {
    let mut out = String::new();

    // 1. Project info.
    if let Some(repo) = &plan_context.repo_info {
        out.push_str(&format!(
            "Project Info: {} files in {}\nLanguages: {:?}\n",
            repo.total_files, repo.repo_path, repo.languages
        ));
    }

    // 2. Architecture tag.
    if let Some(arch) = &plan_context.architecture_type {
        out.push_str(&format!("Architecture: {arch}\n"));
    }

    // 3. Completed-dependency results, first 200 chars each.
    if !task.dependencies.is_empty() {
        let mut dep_lines = String::new();
        for dep_id in &task.dependencies {
            if let Some(dep) = graph.get(*dep_id) {
                if dep.status == crate::task::Status::Completed {
                    if let Some(result) = &dep.result {
                        dep_lines.push_str(&format!("- {}: {}...\n", dep_id, truncate_chars(result, 200)));
                    }
                }
            }
        }
        if !dep_lines.is_empty() {
            out.push_str("\nDependency Results:\n");
            out.push_str(&dep_lines);
        }
    }

    // 4. Retrieved memory, top-k = 3.
    let query = format!("{}\n{}", task.title, task.description);
    if let Ok(rag) = retriever.retrieve(&query, 3).await {
        if !rag.is_empty() {
            out.push_str(&format!("\nRelevant Memory/Code:\n{rag}\n"));
        }
    }

    // 5. Build-system hints, keyed by filename mentioned in title/description
    // that actually exists on disk.
    let mentioned = mentioned_filenames(&format!("{} {}", task.title, task.description));
    let hints = build_hints_for(repo_path, &mentioned);
    if !hints.is_empty() {
        out.push_str("\nBuild Context (How to compile/test tasks):\n");
        out.push_str(&hints.join("\n"));
        out.push('\n');
    }

    // 6. Accumulated user-visible comments.
    let comments: Vec<&str> = task.user_visible_comments(agent_user).map(|c| c.content.as_str()).collect();
    if !comments.is_empty() {
        out.push_str("\nReviewer comments:\n");
        for c in comments {
            out.push_str(&format!("- {c}\n"));
        }
    }

    out
}

/// Find `\w+.\w+`-shaped filename mentions in free text, matching the
/// teacher's build-analyzer hint extraction.
fn mentioned_filenames(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    for word in text.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '_' && c != '-');
        if trimmed.contains('.') && !trimmed.starts_with('.') && !trimmed.ends_with('.') {
            names.push(trimmed.to_string());
        }
    }
    names
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// The build system detected from marker files at the repo root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildSystem {
    Cargo,
    Npm,
    Python,
    Go,
    Unknown,
}

/// Detect the repo's build system the way the original's `BuildAnalyzer`
/// does: inspect the repo root for the canonical marker file of each
/// toolchain.
fn detect_build_system(repo_path: &Path) -> BuildSystem {
    if repo_path.join("Cargo.toml").exists() {
        BuildSystem::Cargo
    } else if repo_path.join("package.json").exists() {
        BuildSystem::Npm
    } else if repo_path.join("pyproject.toml").exists() || repo_path.join("setup.py").exists() {
        BuildSystem::Python
    } else if repo_path.join("go.mod").exists() {
        BuildSystem::Go
    } else {
        BuildSystem::Unknown
    }
}

/// Compile/test commands for a file of this build system, or `None` if the
/// file's extension doesn't belong to it.
fn commands_for(system: BuildSystem, fname: &str) -> Option<&'static str> {
    match system {
        BuildSystem::Cargo if fname.ends_with(".rs") => Some("cargo build, cargo test"),
        BuildSystem::Npm if fname.ends_with(".js") || fname.ends_with(".ts") || fname.ends_with(".tsx") => {
            Some("npm run build, npm test")
        }
        BuildSystem::Python if fname.ends_with(".py") => Some("python -m pytest"),
        BuildSystem::Go if fname.ends_with(".go") => Some("go build ./..., go test ./..."),
        _ => None,
    }
}

/// Build-system hints for files mentioned in a task, restricted to files
/// that exist on disk under `repo_path` -- mirrors the original's
/// `os.path.exists` guard before calling into its build analyzer.
fn build_hints_for(repo_path: &Path, mentioned: &[String]) -> Vec<String> {
    let system = detect_build_system(repo_path);
    if system == BuildSystem::Unknown {
        return Vec::new();
    }
    mentioned
        .iter()
        .filter(|f| repo_path.join(f).exists())
        .filter_map(|f| commands_for(system, f).map(|cmd| format!("{f} -> {cmd}")))
        .collect()
}

/// Invoke the generator for `task`, catching errors as `{success: false, error}`.
#[instrument(skip(task, context_str, generator), fields(task_id = %task.id))]
pub async fn execute(task: &Task, context_str: &str, generator: &dyn Generator) -> ExecutionResult {
    let variables = json!({
        "task_title": task.title,
        "task_description": task.description,
        "repo_context": context_str,
    });

    match generator.generate(TASK_SOLVER_PROMPT, &variables).await {
        Ok(output) => ExecutionResult {
            success: true,
            output: Some(output),
            error: None,
        },
        Err(e) => {
            error!(task_id = %task.id, error = %e, "task execution failed");
            ExecutionResult {
                success: false,
                output: None,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentioned_filenames_finds_dotted_tokens() {
        let names = mentioned_filenames("please fix src/main.rs and also config.toml thanks.");
        assert!(names.iter().any(|n| n.contains("main.rs")));
        assert!(names.iter().any(|n| n.contains("config.toml")));
    }

    #[test]
    fn truncate_chars_handles_short_strings() {
        assert_eq!(truncate_chars("hi", 200), "hi");
    }

    #[test]
    fn build_hints_only_cover_files_that_exist_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        std::fs::write(tmp.path().join("main.rs"), "fn main() {}").unwrap();

        let mentioned = vec!["main.rs".to_string(), "missing.rs".to_string()];
        let hints = build_hints_for(tmp.path(), &mentioned);

        assert_eq!(hints.len(), 1);
        assert!(hints[0].starts_with("main.rs -> cargo"));
    }

    #[test]
    fn build_hints_are_empty_without_a_recognised_build_system() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("main.rs"), "fn main() {}").unwrap();

        let hints = build_hints_for(tmp.path(), &["main.rs".to_string()]);
        assert!(hints.is_empty());
    }
}
