//! SideEffectApplier: parses fenced code blocks, writes files, runs the
//! syntax-repair loop, manages feature branches, and stages changes (§4.5).

use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use crate::executor::ExecutionResult;
use crate::interfaces::{CodeScanner, Generator, VersionControl};
use crate::task::{Task, TaskComment};

const AGENT_AUTHOR: &str = "Yaver Worker";
const SYNTAX_GUARD_AUTHOR: &str = "SyntaxGuard";

/// A single fenced code block extracted from generator output.
struct ExtractedBlock {
    path_raw: Option<String>,
    body: String,
}

/// Extract fenced blocks of the form ` ```lang?:path?\n body``` `, bit-exact
/// per §6's fenced-code-block contract.
fn extract_blocks(output: &str) -> Vec<ExtractedBlock> {
    // language tag optional, `:path` optional, body is everything up to the
    // next closing fence, matched non-greedily across lines.
    let re = Regex::new(r"```(?:\w+)?(?::([^\n]+))?\n(?s:(.*?))```").unwrap();
    re.captures_iter(output)
        .map(|cap| ExtractedBlock {
            path_raw: cap.get(1).map(|m| m.as_str().to_string()),
            body: cap.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect()
}

/// Extract only the first block's body, ignoring any path header -- used
/// for `fix_code` responses, which are expected to be a single block.
fn extract_first_block_body(output: &str) -> Option<String> {
    let re = Regex::new(r"```(?:\w+)?\n(?s:(.*?))```").unwrap();
    re.captures(output).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Whether `path_raw` is a well-formed, writable relative path per the
/// safety checks in §4.5.
fn is_valid_file_path(path: &str) -> bool {
    let trimmed = path.trim();
    if trimmed.contains(' ') || trimmed.contains('(') || trimmed.contains('=') {
        return false;
    }
    if trimmed.is_empty() || trimmed == "." || trimmed == "./" || trimmed.ends_with('/') {
        return false;
    }
    true
}

/// Applier-level collaborators, bundled so `apply` doesn't take eight args.
pub struct SideEffectContext<'a> {
    pub repo_path: &'a Path,
    pub generator: &'a dyn Generator,
    pub scanner: &'a dyn CodeScanner,
    pub vcs: &'a dyn VersionControl,
    pub user_request: &'a str,
    pub default_base_branch: &'a str,
}

/// Apply the side effects of a successful execution result to `task`,
/// returning the list of paths written (relative to the repo root).
pub async fn apply(task: &mut Task, result: &ExecutionResult, ctx: &SideEffectContext<'_>) -> Vec<String> {
    if !result.success {
        return Vec::new();
    }
    let Some(output) = &result.output else {
        return Vec::new();
    };

    manage_branch(task, ctx).await;

    let blocks = extract_blocks(output);
    let mut applied_files = Vec::new();

    for block in blocks {
        let Some(path_raw) = block.path_raw else {
            continue;
        };
        let file_path = path_raw.trim().to_string();
        if !is_valid_file_path(&file_path) {
            warn!(path = %file_path, "skipping invalid file path from generator");
            continue;
        }

        let full_path = ctx.repo_path.join(&file_path);
        if full_path.is_dir() {
            warn!(path = %file_path, "skipping write to existing directory");
            continue;
        }

        match write_file(&full_path, &block.body).await {
            Ok(()) => {
                run_syntax_repair_loop(task, &file_path, &full_path, &block.body, ctx).await;
                info!(path = %file_path, "applied changes");
                applied_files.push(file_path);
            }
            Err(e) => {
                warn!(path = %file_path, error = %e, "failed to write file");
                task.comments.push(TaskComment {
                    author: AGENT_AUTHOR.to_string(),
                    content: format!("\u{274c} Failed to write file {file_path}: {e}"),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    if !applied_files.is_empty() {
        let listing = applied_files.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n");
        task.comments.push(TaskComment {
            author: AGENT_AUTHOR.to_string(),
            content: format!("\u{1F4DD} Modified files:\n{listing}"),
            timestamp: Utc::now(),
        });

        if let Err(e) = ctx.vcs.add(&applied_files).await {
            warn!(error = %e, "failed to stage files");
        }
    }

    applied_files
}

async fn write_file(full_path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(full_path, body).await
}

/// Pre-write branch management (§4.5 branch policy).
async fn manage_branch(task: &Task, ctx: &SideEffectContext<'_>) {
    if task.metadata.skip_branch_creation {
        if let Some(pr_branch) = &task.metadata.pr_branch {
            match ctx.vcs.active_branch().await {
                Ok(current) if &current == pr_branch => {
                    info!(branch = %pr_branch, "already on PR branch");
                }
                _ => {
                    if let Err(e) = ctx.vcs.checkout(pr_branch).await {
                        warn!(branch = %pr_branch, error = %e, "failed to checkout PR branch");
                    }
                }
            }
        }
        return;
    }

    let title_low = task.title.to_lowercase();
    let desc_low = task.description.to_lowercase();
    let request_low = ctx.user_request.to_lowercase();

    let is_pr_requested = title_low.contains("pull request")
        || desc_low.contains("pull request")
        || request_low.contains("pull request")
        || title_low.split_whitespace().any(|w| w == "pr")
        || request_low.split_whitespace().any(|w| w == "pr");

    if !is_pr_requested {
        return;
    }

    let branch_name = format!("yaver-task-{}", task.short_id());
    match ctx.vcs.branch_exists(&branch_name).await {
        Ok(true) => {
            info!(branch = %branch_name, "feature branch exists, switching to it");
            if ctx.vcs.checkout(&branch_name).await.is_err() {
                if let Err(e) = ctx.vcs.checkout_force(&branch_name).await {
                    warn!(branch = %branch_name, error = %e, "forced checkout failed");
                    return;
                }
            }
            if let Err(e) = ctx.vcs.fetch("origin").await {
                warn!(error = %e, "failed to fetch origin before auto-merge");
            }
            let origin_base = format!("origin/{}", ctx.default_base_branch);
            if let Err(e) = ctx.vcs.merge(&origin_base).await {
                warn!(error = %e, "failed to auto-merge base branch into feature branch");
            }
        }
        Ok(false) => {
            info!(branch = %branch_name, "creating feature branch");
            if let Err(e) = ctx.vcs.create_branch(&branch_name).await {
                warn!(branch = %branch_name, error = %e, "failed to create feature branch");
            }
        }
        Err(e) => {
            warn!(error = %e, "git pre-emptive branching failed");
        }
    }
}

/// Exactly one repair attempt per file (§4.5 item 4).
async fn run_syntax_repair_loop(task: &mut Task, file_path: &str, full_path: &PathBuf, original_body: &str, ctx: &SideEffectContext<'_>) {
    let syntax_result = match ctx.scanner.syntax(full_path).await {
        Ok(r) => r,
        Err(e) => {
            warn!(path = %file_path, error = %e, "syntax check failed to run");
            return;
        }
    };

    if syntax_result.valid {
        return;
    }

    let error_msg = syntax_result.error_message.clone().unwrap_or_default();
    warn!(path = %file_path, tool = %syntax_result.tool_used, error = %error_msg, "syntax error detected");
    task.comments.push(TaskComment {
        author: SYNTAX_GUARD_AUTHOR.to_string(),
        content: format!(
            "\u{26A0}\u{FE0F} Syntax Error detected ({}). Attempting auto-fix...\nError: {}",
            syntax_result.tool_used, error_msg
        ),
        timestamp: Utc::now(),
    });

    let fixed_response = match ctx
        .generator
        .fix_code(original_body, &format!("Compiler/Linter Error ({}): {}", syntax_result.tool_used, error_msg))
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "fix_code call failed");
            return;
        }
    };

    let Some(new_code) = extract_first_block_body(&fixed_response) else {
        warn!("could not extract fixed code from generator response");
        return;
    };

    if tokio::fs::write(full_path, &new_code).await.is_err() {
        warn!(path = %file_path, "failed to write auto-fix result");
        return;
    }

    match ctx.scanner.syntax(full_path).await {
        Ok(recheck) if recheck.valid => {
            info!(path = %file_path, "auto-fix successful");
            task.comments.push(TaskComment {
                author: SYNTAX_GUARD_AUTHOR.to_string(),
                content: format!("\u{2705} Auto-fix successful for {file_path}."),
                timestamp: Utc::now(),
            });
        }
        Ok(recheck) => {
            warn!(path = %file_path, "auto-fix failed");
            task.comments.push(TaskComment {
                author: SYNTAX_GUARD_AUTHOR.to_string(),
                content: format!(
                    "\u{274c} Auto-fix failed. Remaining error: {}",
                    recheck.error_message.unwrap_or_default()
                ),
                timestamp: Utc::now(),
            });
        }
        Err(e) => {
            warn!(error = %e, "re-check after auto-fix failed to run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_block_with_path_header() {
        let output = "Here you go:\n```rust:src/main.rs\nfn main() {}\n```\n";
        let blocks = extract_blocks(output);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path_raw.as_deref(), Some("src/main.rs"));
        assert_eq!(blocks[0].body, "fn main() {}\n");
    }

    #[test]
    fn block_without_path_header_is_skipped_for_writing() {
        let output = "```rust\nfn main() {}\n```\n";
        let blocks = extract_blocks(output);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].path_raw.is_none());
    }

    #[test]
    fn rejects_paths_with_whitespace_or_special_chars() {
        assert!(!is_valid_file_path("bad path.rs"));
        assert!(!is_valid_file_path("bad(path).rs"));
        assert!(!is_valid_file_path("bad=path.rs"));
        assert!(!is_valid_file_path("."));
        assert!(!is_valid_file_path("./"));
        assert!(!is_valid_file_path(""));
        assert!(!is_valid_file_path("some/dir/"));
        assert!(is_valid_file_path("src/main.rs"));
    }

    #[test]
    fn extract_first_block_body_ignores_language_tag() {
        let resp = "```python\nfixed = True\n```";
        let body = extract_first_block_body(resp).unwrap();
        assert_eq!(body, "fixed = True\n");
    }

    #[test]
    fn round_trip_extract_write_extract_is_identity_on_body() {
        let body = "line one\nline two\n";
        let output = format!("```rust:a.rs\n{body}```");
        let blocks = extract_blocks(&output);
        assert_eq!(blocks[0].body, body);
    }
}
