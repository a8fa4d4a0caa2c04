//! GitHub API client for locating pull requests and posting comments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::routing::RepoSlug;

/// Public GitHub API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Read/write pull-request interface.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    /// The pull request updated most recently, open or closed.
    async fn latest_pull_request(
        &self,
        repo: &RepoSlug,
    ) -> Result<Option<PullRequestRef>, ClientError>;

    /// Post a new comment on a pull request.
    async fn create_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
    ) -> Result<PostedComment, ClientError>;
}

/// Pull request summary from the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// A created issue comment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostedComment {
    pub id: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Request to create a comment.
#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

/// GitHub REST client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl GitHubClient {
    /// Create a new GitHub client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: &str, base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("incident-relay/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Api { status, body })
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn latest_pull_request(
        &self,
        repo: &RepoSlug,
    ) -> Result<Option<PullRequestRef>, ClientError> {
        let url = format!(
            "{}/repos/{}/{}/pulls",
            self.base_url, repo.owner, repo.repo
        );

        debug!(repo = %repo, "Looking up most recently updated pull request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("state", "all"),
                ("sort", "updated"),
                ("direction", "desc"),
                ("per_page", "1"),
            ])
            .send()
            .await?;
        let response = Self::check(response).await?;

        let bytes = response.bytes().await?;
        let pulls: Vec<PullRequestRef> = serde_json::from_slice(&bytes)?;
        Ok(pulls.into_iter().next())
    }

    async fn create_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
    ) -> Result<PostedComment, ClientError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{number}/comments",
            self.base_url, repo.owner, repo.repo
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&CreateCommentRequest { body })
            .send()
            .await?;
        let response = Self::check(response).await?;

        let bytes = response.bytes().await?;
        let comment: PostedComment = serde_json::from_slice(&bytes)?;
        info!(
            repo = %repo,
            pr = number,
            comment_url = comment.html_url.as_deref().unwrap_or("-"),
            "Posted incident comment"
        );
        Ok(comment)
    }
}
