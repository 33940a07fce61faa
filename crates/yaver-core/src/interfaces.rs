//! External collaborator interfaces (§6).
//!
//! The engine depends only on these trait signatures, never on a concrete
//! backend. Each is object-safe so callers can store `Box<dyn Trait>`; the
//! compile-time assertions below mirror the teacher's `Harness`
//! object-safety check.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyntaxResult {
    pub valid: bool,
    pub error_message: Option<String>,
    pub tool_used: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Finding {
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ForgeUser {
    pub login: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub head_ref: String,
    pub base_ref: String,
    pub state: String,
    pub mergeable: Option<bool>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: String,
    pub body: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Mention {
    pub id: i64,
    pub body: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Issue {
    pub id: i64,
    pub title: String,
}

/// The opaque language-model invocation layer.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt_template: &str, variables: &Value) -> anyhow::Result<String>;

    async fn generate_structured(
        &self,
        prompt_template: &str,
        variables: &Value,
    ) -> anyhow::Result<Value>;

    /// One-shot syntax-repair call: given the failing code and the scanner's
    /// error message, ask for a corrected body.
    async fn fix_code(&self, code: &str, error: &str) -> anyhow::Result<String>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Generator) {}
};

/// Retrieval subsystem: graph/vector index + embedder, opaque here.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<String>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ContextRetriever) {}
};

/// Static-analysis scanners.
#[async_trait]
pub trait CodeScanner: Send + Sync {
    async fn syntax(&self, path: &std::path::Path) -> anyhow::Result<SyntaxResult>;
    async fn complexity(&self, path: &std::path::Path, body: &str) -> anyhow::Result<Vec<Finding>>;
    async fn security(&self, path: &std::path::Path) -> anyhow::Result<Vec<Finding>>;
    async fn lint(&self, path: &std::path::Path) -> anyhow::Result<Vec<Finding>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn CodeScanner) {}
};

/// Local Git transport.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn checkout(&self, reference: &str) -> anyhow::Result<()>;
    async fn checkout_force(&self, reference: &str) -> anyhow::Result<()>;
    async fn create_branch(&self, name: &str) -> anyhow::Result<()>;
    async fn branch_exists(&self, name: &str) -> anyhow::Result<bool>;
    async fn add(&self, paths: &[String]) -> anyhow::Result<()>;
    async fn commit(&self, message: &str) -> anyhow::Result<()>;
    async fn push(&self, remote: &str, reference: &str) -> anyhow::Result<()>;
    async fn fetch(&self, remote: &str) -> anyhow::Result<()>;
    async fn merge(&self, reference: &str) -> anyhow::Result<()>;
    async fn is_dirty(&self) -> anyhow::Result<bool>;
    async fn active_branch(&self) -> anyhow::Result<String>;
    async fn diff(&self, target: &str) -> anyhow::Result<String>;
    async fn checkout_pr(&self, id: i64) -> anyhow::Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn VersionControl) {}
};

/// Remote forge transport (Gitea/GitHub), field names normalised by the
/// adapter (`PullRequest::number`, `head_ref`, `base_ref`, `state`,
/// `mergeable` regardless of backend naming).
#[async_trait]
pub trait ForgeClient: Send + Sync {
    async fn list_repositories(&self) -> anyhow::Result<Vec<Repository>>;
    async fn set_repo(&self, owner: &str, name: &str);
    async fn get_user(&self) -> anyhow::Result<ForgeUser>;
    async fn get_pr(&self, id: i64) -> anyhow::Result<PullRequest>;
    async fn find_pr_by_branch(&self, head: &str, base: &str) -> anyhow::Result<Option<PullRequest>>;
    async fn list_comments(&self, id: i64) -> anyhow::Result<Vec<Comment>>;
    async fn comment(&self, id: i64, body: &str) -> anyhow::Result<Comment>;
    async fn add_reaction(&self, id: i64, kind: &str) -> anyhow::Result<()>;
    async fn list_mentions(&self) -> anyhow::Result<Vec<Mention>>;
    async fn list_assigned_issues(&self) -> anyhow::Result<Vec<Issue>>;
    async fn list_review_requests(&self) -> anyhow::Result<Vec<PullRequest>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ForgeClient) {}
};
