//! GitHub REST Client
//!
//! Minimal typed wrapper over the GitHub v3 REST API covering releases,
//! pull requests and branches. List endpoints follow the `Link` header until
//! the last page. Non-success responses are returned as errors with the
//! status and body; requests are never retried.

use anyhow::{bail, Context, Result};
use reqwest::header::LINK;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, Repository};

const USER_AGENT: &str = "nmshd-ci-bot";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: u32 = 100;

/// GitHub API client bound to a token
pub struct GitHubClient {
    client: Client,
    token: String,
    api_url: String,
}

// ============================================================
// API Types
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: Option<User>,
    pub html_url: Option<String>,
}

impl PullRequest {
    pub fn is_authored_by(&self, login: &str) -> bool {
        self.user.as_ref().is_some_and(|user| user.login == login)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch the changes are merged into
    pub base: String,
    /// Branch containing the changes
    pub head: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPullRequest {
    number: u64,
}

// ============================================================
// Client Implementation
// ============================================================

impl GitHubClient {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            token: token.into(),
            api_url: api_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.token.clone(), config.api_url.clone())
    }

    fn repo_url(&self, repo: &Repository, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_url, repo.owner, repo.name, path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// GET a list endpoint and collect every page
    async fn get_all<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut request = self.client.get(url).query(&[("per_page", PER_PAGE)]);
        let mut page = 1;

        loop {
            debug!(url = %url, page, "GET");
            let response = self
                .authorized(request)
                .send()
                .await
                .with_context(|| format!("Failed to send request to {}", url))?;
            let response = check_status(response).await?;

            let next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_page_url);

            let batch: Vec<T> = response.json().await.with_context(|| {
                format!("Failed to parse response from {} (page {})", url, page)
            })?;
            let batch_len = batch.len();
            items.extend(batch);

            match next {
                Some(next) if batch_len > 0 => {
                    request = self.client.get(next);
                    page += 1;
                }
                _ => return Ok(items),
            }
        }
    }

    /// List releases, newest first
    pub async fn list_releases(&self, repo: &Repository) -> Result<Vec<Release>> {
        self.get_all(&self.repo_url(repo, "releases")).await
    }

    /// List releases whose tag starts with `prefix`, keeping API order
    pub async fn list_releases_with_tag_prefix(
        &self,
        repo: &Repository,
        prefix: &str,
    ) -> Result<Vec<Release>> {
        let releases = self.list_releases(repo).await?;
        debug!(repo = %repo, total = releases.len(), "Fetched releases");
        Ok(filter_by_tag_prefix(releases, prefix))
    }

    pub async fn list_open_pull_requests(&self, repo: &Repository) -> Result<Vec<PullRequest>> {
        let url = format!("{}?state=open", self.repo_url(repo, "pulls"));
        let pulls: Vec<PullRequest> = self.get_all(&url).await?;
        debug!(repo = %repo, open = pulls.len(), "Fetched open pull requests");
        Ok(pulls)
    }

    pub async fn list_branches(&self, repo: &Repository) -> Result<Vec<Branch>> {
        self.get_all(&self.repo_url(repo, "branches")).await
    }

    /// Delete a branch by removing its `refs/heads/<branch>` ref
    pub async fn delete_branch(&self, repo: &Repository, branch: &str) -> Result<()> {
        let url = self.repo_url(repo, &format!("git/refs/heads/{}", branch));
        info!(repo = %repo, branch = %branch, "Deleting branch");

        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .with_context(|| format!("Failed to delete branch {}", branch))?;

        check_status(response).await?;
        Ok(())
    }

    /// Open a pull request and return its number
    pub async fn create_pull_request(
        &self,
        repo: &Repository,
        pull: &NewPullRequest,
    ) -> Result<u64> {
        let url = self.repo_url(repo, "pulls");
        info!(repo = %repo, head = %pull.head, base = %pull.base, "Creating pull request");

        let response = self
            .authorized(self.client.post(&url))
            .json(pull)
            .send()
            .await
            .context("Failed to create pull request")?;

        let created: CreatedPullRequest = check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse pull request response")?;

        Ok(created.number)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    bail!("GitHub API error ({}): {}", status, body);
}

/// URL of the `rel="next"` entry of a `Link` response header
pub fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let url = parts
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?;
        parts
            .filter_map(|param| param.trim().strip_prefix("rel="))
            .any(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
            .then(|| url.to_string())
    })
}

/// Keep releases whose tag name starts with `prefix`
pub fn filter_by_tag_prefix(releases: Vec<Release>, prefix: &str) -> Vec<Release> {
    releases
        .into_iter()
        .filter(|release| release.tag_name.starts_with(prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str) -> Release {
        Release {
            id: 1,
            tag_name: tag.to_string(),
            name: Some(tag.to_string()),
            draft: false,
            prerelease: false,
        }
    }

    #[test]
    fn test_filter_by_tag_prefix_keeps_order() {
        let releases = vec![
            release("helm/6.2.0"),
            release("api/6.2.0"),
            release("helm/6.1.0"),
        ];
        let tags: Vec<String> = filter_by_tag_prefix(releases, "helm/")
            .into_iter()
            .map(|r| r.tag_name)
            .collect();
        assert_eq!(tags, vec!["helm/6.2.0", "helm/6.1.0"]);
    }

    #[test]
    fn test_pull_request_payload() {
        let json = r#"[{
            "number": 42,
            "title": "Bump Helm chart to v6.2.0",
            "state": "open",
            "user": { "login": "github-actions[bot]", "id": 41898282 },
            "html_url": "https://github.com/nmshd/backbone-helm/pull/42",
            "draft": false
        }, {
            "number": 43,
            "title": "Fix typo",
            "state": "open",
            "user": null
        }]"#;
        let pulls: Vec<PullRequest> = serde_json::from_str(json).unwrap();
        assert_eq!(pulls.len(), 2);
        assert!(pulls[0].is_authored_by("github-actions[bot]"));
        assert!(!pulls[1].is_authored_by("github-actions[bot]"));
    }

    #[test]
    fn test_release_payload() {
        let json = r#"{ "id": 7, "tag_name": "helm/6.2.0", "name": null }"#;
        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "helm/6.2.0");
        assert!(release.name.is_none());
        assert!(!release.draft);
    }

    #[test]
    fn test_next_page_url() {
        let link = concat!(
            r#"<https://api.github.com/repositories/1/branches?per_page=100&page=2>; rel="next", "#,
            r#"<https://api.github.com/repositories/1/branches?per_page=100&page=3>; rel="last""#
        );
        assert_eq!(
            next_page_url(link).as_deref(),
            Some("https://api.github.com/repositories/1/branches?per_page=100&page=2")
        );

        // Last page only links backwards
        let last = concat!(
            r#"<https://api.github.com/repositories/1/branches?per_page=100&page=1>; rel="first", "#,
            r#"<https://api.github.com/repositories/1/branches?per_page=100&page=2>; rel="prev""#
        );
        assert_eq!(next_page_url(last), None);
        assert_eq!(next_page_url(""), None);
        assert_eq!(next_page_url("garbage; rel=\"next\""), None);
    }

    #[test]
    fn test_repo_url() {
        let client = GitHubClient::new("token", "https://api.github.com").unwrap();
        let repo = Repository::parse("nmshd/backbone").unwrap();
        assert_eq!(
            client.repo_url(&repo, "git/refs/heads/chart-bump/v1.0.0"),
            "https://api.github.com/repos/nmshd/backbone/git/refs/heads/chart-bump/v1.0.0"
        );
    }
}
