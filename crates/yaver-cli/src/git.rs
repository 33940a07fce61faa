//! Concrete [`VersionControl`] backed by the system `git` binary.
//!
//! Grounded on the teacher's worktree manager: shell out to `git`, capture
//! stdout/stderr, and translate exit status into a typed error.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use yaver_core::interfaces::VersionControl;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("git {command} failed (exit {code}): {stderr}")]
    Exit { command: String, code: i32, stderr: String },
}

pub struct ShellGit {
    repo_path: PathBuf,
}

impl ShellGit {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        ShellGit { repo_path: repo_path.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(GitError::Spawn)?;

        if !output.status.success() {
            return Err(GitError::Exit {
                command: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl VersionControl for ShellGit {
    async fn checkout(&self, reference: &str) -> anyhow::Result<()> {
        self.run(&["checkout", reference]).await?;
        Ok(())
    }

    async fn checkout_force(&self, reference: &str) -> anyhow::Result<()> {
        self.run(&["checkout", "--force", reference]).await?;
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> anyhow::Result<()> {
        self.run(&["checkout", "-b", name]).await?;
        Ok(())
    }

    async fn branch_exists(&self, name: &str) -> anyhow::Result<bool> {
        let verify = format!("refs/heads/{name}");
        Ok(self.run(&["rev-parse", "--verify", &verify]).await.is_ok())
    }

    async fn add(&self, paths: &[String]) -> anyhow::Result<()> {
        let mut args = vec!["add"];
        args.extend(paths.iter().map(String::as_str));
        self.run(&args).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> anyhow::Result<()> {
        self.run(&["commit", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, remote: &str, reference: &str) -> anyhow::Result<()> {
        self.run(&["push", remote, reference]).await?;
        Ok(())
    }

    async fn fetch(&self, remote: &str) -> anyhow::Result<()> {
        self.run(&["fetch", remote]).await?;
        Ok(())
    }

    async fn merge(&self, reference: &str) -> anyhow::Result<()> {
        self.run(&["merge", "--no-edit", reference]).await?;
        Ok(())
    }

    async fn is_dirty(&self) -> anyhow::Result<bool> {
        let status = self.run(&["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }

    async fn active_branch(&self) -> anyhow::Result<String> {
        Ok(self.run(&["branch", "--show-current"]).await?)
    }

    async fn diff(&self, target: &str) -> anyhow::Result<String> {
        Ok(self.run(&["diff", target]).await?)
    }

    async fn checkout_pr(&self, id: i64) -> anyhow::Result<()> {
        let reference = format!("pull/{id}/head");
        self.run(&["fetch", "origin", &reference]).await?;
        self.run(&["checkout", "FETCH_HEAD"]).await?;
        Ok(())
    }
}
