//! Concrete [`ForgeClient`] backed by the Gitea REST API.
//!
//! Grounded on the reference Gitea adapter: bearer-token auth, an
//! owner/repo-scoped API base, and PRs addressed through the issues API for
//! comments and reactions (Gitea's forge model treats PRs as issues for
//! commenting purposes).

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use yaver_core::interfaces::{Comment, ForgeClient, ForgeUser, Issue, Mention, PullRequest, Repository};

pub struct GiteaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    repo: RwLock<(String, String)>,
}

impl GiteaClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        GiteaClient {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            repo: RwLock::new((owner.into(), repo.into())),
        }
    }

    async fn api_url(&self, suffix: &str) -> String {
        let (owner, repo) = self.repo.read().await.clone();
        format!("{}/api/v1/repos/{}/{}{}", self.base_url, owner, repo, suffix)
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("token {}", self.token))
    }
}

#[derive(Deserialize)]
struct GiteaUser {
    login: String,
}

#[derive(Deserialize)]
struct GiteaRepo {
    owner: GiteaUser,
    name: String,
}

#[derive(Deserialize)]
struct GiteaRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Deserialize)]
struct GiteaPullRequest {
    id: i64,
    number: i64,
    head: GiteaRef,
    base: GiteaRef,
    state: String,
    mergeable: Option<bool>,
}

impl From<GiteaPullRequest> for PullRequest {
    fn from(pr: GiteaPullRequest) -> Self {
        PullRequest {
            id: pr.id,
            number: pr.number,
            head_ref: pr.head.ref_name,
            base_ref: pr.base.ref_name,
            state: pr.state,
            mergeable: pr.mergeable,
        }
    }
}

#[derive(Deserialize)]
struct GiteaComment {
    id: i64,
    body: String,
    user: GiteaUser,
}

impl From<GiteaComment> for Comment {
    fn from(c: GiteaComment) -> Self {
        Comment { id: c.id, author: c.user.login, body: c.body }
    }
}

#[derive(Deserialize)]
struct GiteaIssue {
    id: i64,
    title: String,
}

impl From<GiteaIssue> for Issue {
    fn from(i: GiteaIssue) -> Self {
        Issue { id: i.id, title: i.title }
    }
}

#[async_trait]
impl ForgeClient for GiteaClient {
    async fn list_repositories(&self) -> anyhow::Result<Vec<Repository>> {
        let url = format!("{}/api/v1/user/repos", self.base_url);
        let repos: Vec<GiteaRepo> = self.auth(self.http.get(&url)).send().await?.error_for_status()?.json().await?;
        Ok(repos.into_iter().map(|r| Repository { owner: r.owner.login, name: r.name }).collect())
    }

    async fn set_repo(&self, owner: &str, name: &str) {
        let mut guard = self.repo.write().await;
        *guard = (owner.to_string(), name.to_string());
    }

    async fn get_user(&self) -> anyhow::Result<ForgeUser> {
        let url = format!("{}/api/v1/user", self.base_url);
        let user: GiteaUser = self.auth(self.http.get(&url)).send().await?.error_for_status()?.json().await?;
        Ok(ForgeUser { login: user.login })
    }

    async fn get_pr(&self, id: i64) -> anyhow::Result<PullRequest> {
        let url = self.api_url(&format!("/pulls/{id}")).await;
        let pr: GiteaPullRequest = self.auth(self.http.get(&url)).send().await?.error_for_status()?.json().await?;
        Ok(pr.into())
    }

    async fn find_pr_by_branch(&self, head: &str, base: &str) -> anyhow::Result<Option<PullRequest>> {
        let url = self.api_url("/pulls").await;
        let prs: Vec<GiteaPullRequest> = self
            .auth(self.http.get(&url).query(&[("state", "open")]))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(prs.into_iter().find(|pr| pr.head.ref_name == head && pr.base.ref_name == base).map(Into::into))
    }

    async fn list_comments(&self, id: i64) -> anyhow::Result<Vec<Comment>> {
        let url = self.api_url(&format!("/issues/{id}/comments")).await;
        let comments: Vec<GiteaComment> = self.auth(self.http.get(&url)).send().await?.error_for_status()?.json().await?;
        Ok(comments.into_iter().map(Into::into).collect())
    }

    async fn comment(&self, id: i64, body: &str) -> anyhow::Result<Comment> {
        let url = self.api_url(&format!("/issues/{id}/comments")).await;
        let created: GiteaComment = self
            .auth(self.http.post(&url).json(&serde_json::json!({ "body": body })))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created.into())
    }

    async fn add_reaction(&self, id: i64, kind: &str) -> anyhow::Result<()> {
        let url = self.api_url(&format!("/issues/{id}/reactions")).await;
        self.auth(self.http.post(&url).json(&serde_json::json!({ "content": kind })))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_mentions(&self) -> anyhow::Result<Vec<Mention>> {
        let url = format!("{}/api/v1/notifications", self.base_url);
        let response = self
            .auth(self.http.get(&url).query(&[("subject-type", "mention")]))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;
        let mentions = response
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let id = item.get("id")?.as_i64()?;
                        let body = item.get("subject")?.get("title")?.as_str()?.to_string();
                        Some(Mention { id, body })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(mentions)
    }

    async fn list_assigned_issues(&self) -> anyhow::Result<Vec<Issue>> {
        let url = self.api_url("/issues").await;
        let issues: Vec<GiteaIssue> = self
            .auth(self.http.get(&url).query(&[("assigned", "true"), ("state", "open")]))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(issues.into_iter().map(Into::into).collect())
    }

    async fn list_review_requests(&self) -> anyhow::Result<Vec<PullRequest>> {
        let me = self.get_user().await?;
        let url = self.api_url("/pulls").await;
        let prs: Vec<serde_json::Value> = self
            .auth(self.http.get(&url).query(&[("state", "open")]))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let requested = prs
            .into_iter()
            .filter(|pr| {
                pr.get("requested_reviewers")
                    .and_then(|r| r.as_array())
                    .is_some_and(|reviewers| reviewers.iter().any(|r| r.get("login").and_then(|l| l.as_str()) == Some(me.login.as_str())))
            })
            .filter_map(|pr| serde_json::from_value::<GiteaPullRequest>(pr).ok())
            .map(Into::into)
            .collect();
        Ok(requested)
    }
}
