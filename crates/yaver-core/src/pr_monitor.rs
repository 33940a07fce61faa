//! ReactivePRMonitor: polls the forge for new PR comments, acknowledges
//! them, and spawns feedback tasks (§4.6).

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::interfaces::{ForgeClient, PullRequest};
use crate::task::{Priority, Status, Task};

const CONFLICT_KEYWORDS: [&str; 3] = ["conflict", "merge", "resolve"];

/// Active PR metadata, the subset the engine needs to react (§3).
#[derive(Debug, Clone)]
pub struct ActivePr {
    pub id: i64,
    pub number: i64,
    pub head_ref: String,
    pub base_ref: String,
    pub mergeable: Option<bool>,
    pub processed_comment_ids: Vec<i64>,
}

impl From<PullRequest> for ActivePr {
    fn from(pr: PullRequest) -> Self {
        ActivePr {
            id: pr.id,
            number: pr.number,
            head_ref: pr.head_ref,
            base_ref: pr.base_ref,
            mergeable: pr.mergeable,
            processed_comment_ids: Vec::new(),
        }
    }
}

/// Resolved once at monitor construction. A failure here is a hard
/// configuration error (§9 open-question resolution): we never fall back
/// to a hardcoded placeholder identity.
#[derive(Debug, thiserror::Error)]
#[error("failed to resolve agent identity from forge: {0}")]
pub struct AgentIdentityError(String);

pub struct ReactivePrMonitor {
    agent_user: String,
}

impl ReactivePrMonitor {
    pub async fn new(forge: &dyn ForgeClient) -> Result<Self, AgentIdentityError> {
        let user = forge.get_user().await.map_err(|e| AgentIdentityError(e.to_string()))?;
        Ok(ReactivePrMonitor { agent_user: user.login })
    }

    pub fn agent_user(&self) -> &str {
        &self.agent_user
    }

    /// Proactive PR discovery when no `active_pr` is set yet but the
    /// working copy is on a non-default branch.
    pub async fn discover_active_pr(
        &self,
        forge: &dyn ForgeClient,
        current_branch: &str,
        default_branch: &str,
    ) -> Option<ActivePr> {
        if current_branch == default_branch {
            return None;
        }
        match forge.find_pr_by_branch(current_branch, default_branch).await {
            Ok(Some(pr)) => Some(pr.into()),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "forge unavailable during PR discovery");
                None
            }
        }
    }

    /// One monitoring pass. Returns the newly spawned feedback tasks, if
    /// any; mutates `active_pr.processed_comment_ids` in place.
    #[instrument(skip_all, fields(pr_id = active_pr.id))]
    pub async fn poll(&self, forge: &dyn ForgeClient, active_pr: &mut ActivePr) -> Vec<Task> {
        let refreshed = match forge.get_pr(active_pr.id).await {
            Ok(pr) => pr,
            Err(e) => {
                warn!(error = %e, "forge unavailable; skipping reactive monitor this iteration");
                return Vec::new();
            }
        };
        if refreshed.state != "open" {
            return Vec::new();
        }
        active_pr.mergeable = refreshed.mergeable;

        let comments = match forge.list_comments(active_pr.id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "forge unavailable while listing comments");
                return Vec::new();
            }
        };

        let mut new_tasks = Vec::new();

        for comment in comments {
            if active_pr.processed_comment_ids.contains(&comment.id) || comment.author == self.agent_user {
                continue;
            }

            if let Err(e) = forge.add_reaction(active_pr.id, "eyes").await {
                warn!(error = %e, "failed to post eyes reaction");
            }

            let ack_body = format!(
                "\u{1F440} I've seen your feedback: '{}'\n\nI'm starting to work on this now. I'll push the fixes shortly.",
                comment.body
            );
            match forge.comment(active_pr.id, &ack_body).await {
                Ok(ack) => {
                    active_pr.processed_comment_ids.push(ack.id);
                }
                Err(e) => {
                    warn!(error = %e, "failed to post acknowledgement comment");
                }
            }

            let is_conflict_resolution = classify_conflict(&comment.body);

            let mut task = Task::new(
                format!("PR feedback: {}", truncate_chars(&comment.body, 80)),
                comment.body.clone(),
                Priority::High,
            );
            task.status = Status::Pending;
            task.metadata.is_pr_feedback = true;
            task.metadata.is_conflict_resolution = is_conflict_resolution;
            task.metadata.pr_id = Some(active_pr.id);
            task.metadata.pr_branch = Some(active_pr.head_ref.clone());
            task.metadata.skip_branch_creation = true;
            task.metadata.originating_comment_id = Some(comment.id);
            task.comments.push(crate::task::TaskComment {
                author: comment.author.clone(),
                content: comment.body.clone(),
                timestamp: Utc::now(),
            });

            new_tasks.push(task);
            active_pr.processed_comment_ids.push(comment.id);
        }

        new_tasks
    }
}

/// Case-insensitive substring match against the conflict-keyword set.
fn classify_conflict(body: &str) -> bool {
    let low = body.to_lowercase();
    CONFLICT_KEYWORDS.iter().any(|kw| low.contains(kw))
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Conflict-resolution pre-execution (§4.6): reproduce merge-conflict
/// markers in the working copy before the executor sees the task.
pub async fn reproduce_conflict(vcs: &dyn crate::interfaces::VersionControl, pr_branch: &str, base_ref: &str) {
    if let Err(e) = vcs.checkout(pr_branch).await {
        warn!(branch = %pr_branch, error = %e, "failed to checkout PR branch for conflict reproduction");
        return;
    }
    if let Err(e) = vcs.fetch("origin").await {
        warn!(error = %e, "failed to fetch origin for conflict reproduction");
    }
    let origin_base = format!("origin/{base_ref}");
    match vcs.merge(&origin_base).await {
        Ok(()) => info!("merge succeeded cleanly; no conflict to reproduce"),
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            if msg.contains("conflict") {
                info!("conflict markers reproduced in working copy");
            } else {
                error!(error = %e, "unexpected merge failure during conflict reproduction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_conflict_keywords_case_insensitively() {
        assert!(classify_conflict("please RESOLVE merge conflict"));
        assert!(classify_conflict("there's a CONFLICT here"));
        assert!(!classify_conflict("please fix typo"));
    }
}
