//! `ReviewHost` backed by the GitHub REST v3 API.
//!
//! Documentation: https://docs.github.com/en/rest

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use swagger_to_sdk_core::contract::{NewPullRequest, PullRequest, PullRequestOutcome, ReviewHost, User};
use swagger_to_sdk_core::error::CollaboratorError;

pub const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "swagger-to-sdk";
const PAGE_SIZE: usize = 100;
const ALREADY_EXISTS_PREFIX: &str = "A pull request already exists";

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    token: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    parent: Option<ApiRepositoryRef>,
}

#[derive(Debug, Deserialize)]
struct ApiRepositoryRef {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPullRequest {
    number: u64,
    html_url: String,
    #[serde(default)]
    merged: bool,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
}

#[derive(Debug, Serialize)]
struct ApiNewPullRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiNewComment<'a> {
    body: &'a str,
}

impl From<ApiPullRequest> for PullRequest {
    fn from(pr: ApiPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            html_url: pr.html_url,
            merged: pr.merged,
        }
    }
}

/// Whether a 422 body says a pull request for this head already exists.
pub fn is_already_exists(body: &Value) -> bool {
    body.get("errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|error| error.get("message").and_then(Value::as_str))
        .any(|message| message.starts_with(ALREADY_EXISTS_PREFIX))
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(token, GITHUB_API_URL.to_string())
    }

    pub fn with_base_url(token: Option<String>, base_url: String) -> Self {
        GitHubClient {
            http: Client::new(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(method = %method, url = %url, "GitHub request");
        let builder = self
            .http
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CollaboratorError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, url = %url, body = %body, "GitHub API call failed");
    Err(format!("GitHub API {url} answered {status}: {body}").into())
}

#[async_trait]
impl ReviewHost for GitHubClient {
    async fn current_user(&self) -> Result<User, CollaboratorError> {
        let user: ApiUser = self.get_json("/user").await?;
        tracing::info!(login = %user.login, "Authenticated GitHub user");
        Ok(User {
            login: user.login,
            name: user.name,
            email: user.email,
        })
    }

    async fn repository_parent(&self, repo_id: &str) -> Result<Option<String>, CollaboratorError> {
        let repo: ApiRepository = self.get_json(&format!("/repos/{repo_id}")).await?;
        Ok(repo.parent.map(|parent| parent.full_name))
    }

    async fn pull_request(&self, repo_id: &str, number: u64) -> Result<PullRequest, CollaboratorError> {
        let pr: ApiPullRequest = self.get_json(&format!("/repos/{repo_id}/pulls/{number}")).await?;
        Ok(pr.into())
    }

    async fn pull_request_files(&self, repo_id: &str, number: u64) -> Result<Vec<String>, CollaboratorError> {
        let mut files = Vec::new();
        for page in 1.. {
            let batch: Vec<ApiFile> = self
                .get_json(&format!(
                    "/repos/{repo_id}/pulls/{number}/files?per_page={PAGE_SIZE}&page={page}"
                ))
                .await?;
            let last = batch.len() < PAGE_SIZE;
            files.extend(batch.into_iter().map(|file| file.filename));
            if last {
                break;
            }
        }
        tracing::debug!(repo_id, number, count = files.len(), "Fetched pull request files");
        Ok(files)
    }

    async fn commit_message(&self, repo_id: &str, sha: &str) -> Result<String, CollaboratorError> {
        let commit: ApiCommit = self.get_json(&format!("/repos/{repo_id}/commits/{sha}")).await?;
        Ok(commit.commit.message)
    }

    async fn create_pull_request(
        &self,
        repo_id: &str,
        request: NewPullRequest,
    ) -> Result<PullRequestOutcome, CollaboratorError> {
        let body = ApiNewPullRequest {
            title: &request.title,
            body: &request.body,
            head: &request.head,
            base: &request.base,
        };
        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{repo_id}/pulls"))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let text = response.text().await?;
            let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            if is_already_exists(&parsed) {
                tracing::info!(repo_id, head = %request.head, "Pull request already exists");
                return Ok(PullRequestOutcome::AlreadyExists);
            }
            tracing::error!(repo_id, body = %text, "Pull request rejected");
            return Err(format!("GitHub refused the pull request: {text}").into());
        }

        let pr: ApiPullRequest = ensure_success(response).await?.json().await?;
        Ok(PullRequestOutcome::Created(pr.into()))
    }

    async fn create_comment(&self, repo_id: &str, number: u64, body: &str) -> Result<(), CollaboratorError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{repo_id}/issues/{number}/comments"))
            .json(&ApiNewComment { body })
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::info!(repo_id, number, "Comment posted");
        Ok(())
    }
}
