//! Boundary scenarios from the engine's testable-properties list that are
//! not already covered by a module's own `#[cfg(test)]` suite: conflict
//! reproduction, one-shot syntax auto-fix, and agent-identity resolution
//! failure.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use yaver_core::executor::ExecutionResult;
use yaver_core::interfaces::{
    CodeScanner, Comment, Finding, ForgeClient, ForgeUser, Generator, Issue, Mention, PullRequest, Repository, SyntaxResult, VersionControl,
};
use yaver_core::pr_monitor::{reproduce_conflict, ReactivePrMonitor};
use yaver_core::side_effects::{self, SideEffectContext};
use yaver_core::task::{Priority, Task};

struct RecordingVcs {
    calls: Mutex<Vec<String>>,
    merge_outcome: Result<(), String>,
}

impl RecordingVcs {
    fn new(merge_outcome: Result<(), String>) -> Self {
        RecordingVcs { calls: Mutex::new(Vec::new()), merge_outcome }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl VersionControl for RecordingVcs {
    async fn checkout(&self, reference: &str) -> anyhow::Result<()> {
        self.record(&format!("checkout:{reference}"));
        Ok(())
    }
    async fn checkout_force(&self, _reference: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn create_branch(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn branch_exists(&self, _name: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
    async fn add(&self, _paths: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn commit(&self, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn push(&self, _remote: &str, _reference: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn fetch(&self, remote: &str) -> anyhow::Result<()> {
        self.record(&format!("fetch:{remote}"));
        Ok(())
    }
    async fn merge(&self, reference: &str) -> anyhow::Result<()> {
        self.record(&format!("merge:{reference}"));
        self.merge_outcome.clone().map_err(|e| anyhow::anyhow!(e))
    }
    async fn is_dirty(&self) -> anyhow::Result<bool> {
        Ok(false)
    }
    async fn active_branch(&self) -> anyhow::Result<String> {
        Ok("feature".to_string())
    }
    async fn diff(&self, _target: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
    async fn checkout_pr(&self, _id: i64) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn conflict_resolution_checks_out_branch_and_attempts_merge() {
    let vcs = RecordingVcs::new(Err("CONFLICT (content): Merge conflict in file.rs".to_string()));
    reproduce_conflict(&vcs, "feature", "main").await;

    let calls = vcs.calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["checkout:feature".to_string(), "fetch:origin".to_string(), "merge:origin/main".to_string()]);
}

#[tokio::test]
async fn conflict_resolution_tolerates_clean_merge() {
    let vcs = RecordingVcs::new(Ok(()));
    reproduce_conflict(&vcs, "feature", "main").await;
    let calls = vcs.calls.lock().unwrap().clone();
    assert!(calls.contains(&"merge:origin/main".to_string()));
}

struct TwoShotGenerator {
    fix_response: String,
}

#[async_trait]
impl Generator for TwoShotGenerator {
    async fn generate(&self, _t: &str, _v: &serde_json::Value) -> anyhow::Result<String> {
        Ok(String::new())
    }
    async fn generate_structured(&self, _t: &str, _v: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
    async fn fix_code(&self, _code: &str, _error: &str) -> anyhow::Result<String> {
        Ok(self.fix_response.clone())
    }
}

struct FirstCallInvalidScanner {
    calls: Mutex<u32>,
}

#[async_trait]
impl CodeScanner for FirstCallInvalidScanner {
    async fn syntax(&self, _path: &Path) -> anyhow::Result<SyntaxResult> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            Ok(SyntaxResult { valid: false, error_message: Some("unexpected EOF".to_string()), tool_used: "fake-linter".to_string() })
        } else {
            Ok(SyntaxResult { valid: true, error_message: None, tool_used: "fake-linter".to_string() })
        }
    }
    async fn complexity(&self, _path: &Path, _body: &str) -> anyhow::Result<Vec<Finding>> {
        Ok(vec![])
    }
    async fn security(&self, _path: &Path) -> anyhow::Result<Vec<Finding>> {
        Ok(vec![])
    }
    async fn lint(&self, _path: &Path) -> anyhow::Result<Vec<Finding>> {
        Ok(vec![])
    }
}

struct NoopVcs;
#[async_trait]
impl VersionControl for NoopVcs {
    async fn checkout(&self, _r: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn checkout_force(&self, _r: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn create_branch(&self, _n: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn branch_exists(&self, _n: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
    async fn add(&self, _paths: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn commit(&self, _m: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn push(&self, _r: &str, _reference: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn fetch(&self, _r: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn merge(&self, _r: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn is_dirty(&self) -> anyhow::Result<bool> {
        Ok(false)
    }
    async fn active_branch(&self) -> anyhow::Result<String> {
        Ok("main".to_string())
    }
    async fn diff(&self, _t: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
    async fn checkout_pr(&self, _id: i64) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn syntax_auto_fix_writes_second_body_and_marks_success() {
    let tmp = tempfile::tempdir().unwrap();
    let generator = TwoShotGenerator { fix_response: "```rust\nfn main() { /* fixed */ }\n```".to_string() };
    let scanner = FirstCallInvalidScanner { calls: Mutex::new(0) };
    let vcs = NoopVcs;

    let mut task = Task::new("fix it", "fix it", Priority::Medium);
    let exec_result = ExecutionResult {
        success: true,
        output: Some("```rust:src/main.rs\nfn main() { /* broken */ }\n```".to_string()),
        error: None,
    };

    let ctx = SideEffectContext {
        repo_path: tmp.path(),
        generator: &generator,
        scanner: &scanner,
        vcs: &vcs,
        user_request: "fix it",
        default_base_branch: "main",
    };

    let applied = side_effects::apply(&mut task, &exec_result, &ctx).await;
    assert_eq!(applied, vec!["src/main.rs".to_string()]);

    let written = std::fs::read_to_string(tmp.path().join("src/main.rs")).unwrap();
    assert_eq!(written, "fn main() { /* fixed */ }\n");

    let success_comment = task.comments.iter().any(|c| c.content.contains("Auto-fix successful"));
    assert!(success_comment, "expected an auto-fix success comment, got: {:?}", task.comments);
}

struct FailingIdentityForge;
#[async_trait]
impl ForgeClient for FailingIdentityForge {
    async fn list_repositories(&self) -> anyhow::Result<Vec<Repository>> {
        Ok(vec![])
    }
    async fn set_repo(&self, _o: &str, _n: &str) {}
    async fn get_user(&self) -> anyhow::Result<ForgeUser> {
        Err(anyhow::anyhow!("401 Unauthorized"))
    }
    async fn get_pr(&self, id: i64) -> anyhow::Result<PullRequest> {
        Ok(PullRequest { id, number: id, head_ref: "x".to_string(), base_ref: "main".to_string(), state: "open".to_string(), mergeable: None })
    }
    async fn find_pr_by_branch(&self, _h: &str, _b: &str) -> anyhow::Result<Option<PullRequest>> {
        Ok(None)
    }
    async fn list_comments(&self, _id: i64) -> anyhow::Result<Vec<Comment>> {
        Ok(vec![])
    }
    async fn comment(&self, id: i64, body: &str) -> anyhow::Result<Comment> {
        Ok(Comment { id, author: "x".to_string(), body: body.to_string() })
    }
    async fn add_reaction(&self, _id: i64, _kind: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn list_mentions(&self) -> anyhow::Result<Vec<Mention>> {
        Ok(vec![])
    }
    async fn list_assigned_issues(&self) -> anyhow::Result<Vec<Issue>> {
        Ok(vec![])
    }
    async fn list_review_requests(&self) -> anyhow::Result<Vec<PullRequest>> {
        Ok(vec![])
    }
}

#[tokio::test]
async fn agent_identity_resolution_failure_never_falls_back_to_a_placeholder() {
    let forge = FailingIdentityForge;
    let result = ReactivePrMonitor::new(&forge).await;
    assert!(result.is_err(), "monitor construction should fail rather than default to a placeholder identity");
}
