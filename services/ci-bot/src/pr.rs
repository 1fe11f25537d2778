//! Chart Bump Pull Requests
//!
//! Decides whether a new upstream Helm chart release needs a version-bump
//! pull request, based on the packaged version, the open bump PR (if any)
//! and the newest upstream release.

use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use serde::Serialize;
use tracing::{info, warn};

use crate::chart::{
    bump_title, push_bump_branch, version_from_pr_title, version_from_release_tag,
    BUMP_BRANCH_PREFIX, RELEASE_TAG_PREFIX,
};
use crate::config::Repository;
use crate::git::GitCli;
use crate::github::{GitHubClient, NewPullRequest, PullRequest, Release};

/// Login that authors automated bump pull requests
pub const DEFAULT_BOT_LOGIN: &str = "github-actions[bot]";

/// An open bump pull request and the version it proposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenBump {
    pub number: u64,
    pub version: Version,
}

/// What the bump workflow should do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum BumpDecision {
    /// Upstream has no chart release yet
    NoUpstreamRelease,
    /// The packaged version is already the newest
    UpToDate,
    /// A bump PR for the newest version is already open
    PullRequestOpen { number: u64 },
    /// Open a new bump PR after removing leftover bump branches
    OpenPullRequest {
        version: Version,
        stale_branches: Vec<String>,
    },
}

/// Observed state the decision is made from
#[derive(Debug, Clone)]
pub struct BumpInputs {
    pub current: Version,
    pub open_bump: Option<OpenBump>,
    pub upstream: Option<Version>,
    pub branches: Vec<String>,
}

/// Summary printed by the `chart-bump` tool
#[derive(Debug, Serialize)]
pub struct BumpSummary {
    pub repository: String,
    pub current: Version,
    pub open_bump: Option<OpenBump>,
    pub upstream: Option<Version>,
    #[serde(flatten)]
    pub decision: BumpDecision,
    pub created_pull_request: Option<u64>,
    pub dry_run: bool,
}

/// First open PR authored by `login` whose title ends in a version.
///
/// The API lists pull requests newest first.
pub fn find_open_bump(pulls: &[PullRequest], login: &str) -> Option<OpenBump> {
    pulls
        .iter()
        .filter(|pull| pull.is_authored_by(login))
        .find_map(|pull| {
            version_from_pr_title(&pull.title).map(|version| OpenBump {
                number: pull.number,
                version,
            })
        })
}

/// Newest published, non-prerelease upstream chart version
pub fn latest_upstream_version(releases: &[Release], prefix: &str) -> Option<Version> {
    releases
        .iter()
        .filter(|release| !release.draft && !release.prerelease)
        .find_map(|release| version_from_release_tag(&release.tag_name, prefix))
}

pub fn plan_bump(inputs: &BumpInputs) -> BumpDecision {
    let Some(upstream) = &inputs.upstream else {
        return BumpDecision::NoUpstreamRelease;
    };

    if *upstream <= inputs.current {
        return BumpDecision::UpToDate;
    }

    if let Some(open) = inputs.open_bump.as_ref().filter(|open| open.version == *upstream) {
        return BumpDecision::PullRequestOpen {
            number: open.number,
        };
    }

    let stale_branches = inputs
        .branches
        .iter()
        .filter(|branch| branch.starts_with(BUMP_BRANCH_PREFIX))
        .cloned()
        .collect();

    BumpDecision::OpenPullRequest {
        version: upstream.clone(),
        stale_branches,
    }
}

/// Hosting operations a bump needs besides git itself
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    async fn delete_branch(&self, repo: &Repository, branch: &str) -> Result<()>;

    /// Open a pull request and return its number
    async fn create_pull_request(&self, repo: &Repository, pull: &NewPullRequest) -> Result<u64>;
}

#[async_trait]
impl PullRequestHost for GitHubClient {
    async fn delete_branch(&self, repo: &Repository, branch: &str) -> Result<()> {
        GitHubClient::delete_branch(self, repo, branch).await
    }

    async fn create_pull_request(&self, repo: &Repository, pull: &NewPullRequest) -> Result<u64> {
        GitHubClient::create_pull_request(self, repo, pull).await
    }
}

/// Where a bump pull request is pushed and opened
#[derive(Debug, Clone)]
pub struct BumpTarget {
    /// Repository receiving the pull request
    pub repository: Repository,
    /// Upstream `owner/repo` linked from the PR body
    pub upstream: String,
    /// Branch the pull request targets
    pub base: String,
    /// Git remote the bump branch is pushed to
    pub remote: String,
}

/// Carry out `decision` and return the number of the opened pull request.
///
/// Only `OpenPullRequest` does anything: stale bump branches are deleted,
/// the bump branch is committed and pushed, then the PR is opened. With
/// `dry_run` nothing is touched.
pub async fn apply_bump<H: PullRequestHost>(
    host: &H,
    git: &GitCli,
    target: &BumpTarget,
    current: &Version,
    decision: &BumpDecision,
    dry_run: bool,
) -> Result<Option<u64>> {
    let BumpDecision::OpenPullRequest {
        version,
        stale_branches,
    } = decision
    else {
        return Ok(None);
    };

    if dry_run {
        warn!("DRY RUN - would open bump PR for v{}", version);
        return Ok(None);
    }

    for branch in stale_branches {
        host.delete_branch(&target.repository, branch).await?;
    }

    let branch = push_bump_branch(git, &target.remote, version).await?;
    let number = host
        .create_pull_request(
            &target.repository,
            &NewPullRequest {
                title: bump_title(version),
                body: bump_body(current, version, &target.upstream),
                base: target.base.clone(),
                head: branch,
            },
        )
        .await?;
    info!(number, "Opened bump pull request");
    Ok(Some(number))
}

/// Body of the bump pull request
pub fn bump_body(current: &Version, upstream: &Version, source: &str) -> String {
    format!(
        "Updates the packaged Helm chart from `{}` to `{}`.\n\nUpstream release: https://github.com/{}/releases/tag/{}{}\n",
        current, upstream, source, RELEASE_TAG_PREFIX, upstream
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartVersionFile;
    use crate::git::tests::{add_bare_remote, commit_file, file_at, init_repo};
    use crate::github::User;
    use std::sync::Mutex;

    /// Records the hosting calls made during a bump
    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHost {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PullRequestHost for RecordingHost {
        async fn delete_branch(&self, repo: &Repository, branch: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {}:{}", repo, branch));
            Ok(())
        }

        async fn create_pull_request(
            &self,
            repo: &Repository,
            pull: &NewPullRequest,
        ) -> Result<u64> {
            self.calls.lock().unwrap().push(format!(
                "create {}:{} -> {} ({})",
                repo, pull.head, pull.base, pull.title
            ));
            Ok(7)
        }
    }

    fn target() -> BumpTarget {
        BumpTarget {
            repository: Repository::parse("nmshd/backbone-helm").unwrap(),
            upstream: "nmshd/backbone".to_string(),
            base: "main".to_string(),
            remote: "origin".to_string(),
        }
    }

    fn open_decision() -> BumpDecision {
        BumpDecision::OpenPullRequest {
            version: v("6.2.0"),
            stale_branches: vec!["chart-bump/v6.1.5".to_string()],
        }
    }

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    fn pull(number: u64, title: &str, login: &str) -> PullRequest {
        PullRequest {
            number,
            title: title.to_string(),
            state: "open".to_string(),
            user: Some(User {
                login: login.to_string(),
            }),
            html_url: None,
        }
    }

    fn release(tag: &str, prerelease: bool) -> Release {
        Release {
            id: 1,
            tag_name: tag.to_string(),
            name: None,
            draft: false,
            prerelease,
        }
    }

    fn inputs(upstream: Option<&str>, open: Option<(u64, &str)>) -> BumpInputs {
        BumpInputs {
            current: v("6.1.0"),
            open_bump: open.map(|(number, version)| OpenBump {
                number,
                version: v(version),
            }),
            upstream: upstream.map(v),
            branches: vec![
                "main".to_string(),
                "chart-bump/v6.1.5".to_string(),
                "feature/x".to_string(),
            ],
        }
    }

    #[test]
    fn test_find_open_bump() {
        let pulls = vec![
            pull(10, "Fix docs", DEFAULT_BOT_LOGIN),
            pull(11, "Bump Helm chart to v9.9.9", "someone"),
            pull(12, "Bump Helm chart to v6.2.0", DEFAULT_BOT_LOGIN),
            pull(13, "Bump Helm chart to v6.1.5", DEFAULT_BOT_LOGIN),
        ];
        assert_eq!(
            find_open_bump(&pulls, DEFAULT_BOT_LOGIN),
            Some(OpenBump {
                number: 12,
                version: v("6.2.0")
            })
        );
        assert_eq!(find_open_bump(&pulls[..2], DEFAULT_BOT_LOGIN), None);
    }

    #[test]
    fn test_latest_upstream_version() {
        let releases = vec![
            release("api/7.0.0", false),
            release("helm/7.0.0-rc.1", true),
            release("helm/6.2.0", false),
            release("helm/6.1.0", false),
        ];
        assert_eq!(
            latest_upstream_version(&releases, RELEASE_TAG_PREFIX),
            Some(v("6.2.0"))
        );
        assert_eq!(latest_upstream_version(&releases[..2], RELEASE_TAG_PREFIX), None);
    }

    #[test]
    fn test_plan_without_upstream() {
        assert_eq!(plan_bump(&inputs(None, None)), BumpDecision::NoUpstreamRelease);
    }

    #[test]
    fn test_plan_up_to_date() {
        assert_eq!(plan_bump(&inputs(Some("6.1.0"), None)), BumpDecision::UpToDate);
        // Never downgrade
        assert_eq!(plan_bump(&inputs(Some("6.0.9"), None)), BumpDecision::UpToDate);
    }

    #[test]
    fn test_plan_pull_request_already_open() {
        assert_eq!(
            plan_bump(&inputs(Some("6.2.0"), Some((12, "6.2.0")))),
            BumpDecision::PullRequestOpen { number: 12 }
        );
    }

    #[test]
    fn test_plan_replaces_outdated_bump() {
        assert_eq!(
            plan_bump(&inputs(Some("6.2.0"), Some((11, "6.1.5")))),
            BumpDecision::OpenPullRequest {
                version: v("6.2.0"),
                stale_branches: vec!["chart-bump/v6.1.5".to_string()],
            }
        );
    }

    #[test]
    fn test_summary_json() {
        let summary = BumpSummary {
            repository: "nmshd/backbone-helm".to_string(),
            current: v("6.1.0"),
            open_bump: None,
            upstream: Some(v("6.1.0")),
            decision: BumpDecision::UpToDate,
            created_pull_request: None,
            dry_run: false,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["decision"], "up_to_date");
        assert_eq!(json["current"], "6.1.0");
    }

    #[test]
    fn test_bump_body_links_release() {
        let body = bump_body(&v("6.1.0"), &v("6.2.0"), "nmshd/backbone");
        assert!(body.contains("https://github.com/nmshd/backbone/releases/tag/helm/6.2.0"));
    }

    #[tokio::test]
    async fn test_apply_bump_pushes_branch_and_opens_pr() {
        let (_dir, git) = init_repo().await;
        commit_file(&git, ChartVersionFile::NAME, "6.1.0\n", "Add chart version").await;
        let (_remote_dir, remote) = add_bare_remote(&git).await;
        let host = RecordingHost::default();

        let created = apply_bump(&host, &git, &target(), &v("6.1.0"), &open_decision(), false)
            .await
            .unwrap();

        assert_eq!(created, Some(7));
        assert_eq!(
            host.calls(),
            vec![
                "delete nmshd/backbone-helm:chart-bump/v6.1.5".to_string(),
                "create nmshd/backbone-helm:chart-bump/v6.2.0 -> main (Bump Helm chart to v6.2.0)"
                    .to_string(),
            ]
        );
        assert_eq!(
            file_at(&remote, "chart-bump/v6.2.0", ChartVersionFile::NAME).await,
            "6.2.0"
        );
        assert_eq!(
            remote.commit_subject("chart-bump/v6.2.0").await.unwrap(),
            "Bump Helm chart to v6.2.0"
        );
    }

    #[tokio::test]
    async fn test_apply_bump_dry_run_touches_nothing() {
        let (_dir, git) = init_repo().await;
        commit_file(&git, ChartVersionFile::NAME, "6.1.0\n", "Add chart version").await;
        let (_remote_dir, remote) = add_bare_remote(&git).await;
        let host = RecordingHost::default();

        let created = apply_bump(&host, &git, &target(), &v("6.1.0"), &open_decision(), true)
            .await
            .unwrap();

        assert_eq!(created, None);
        assert!(host.calls().is_empty());
        assert!(git.rev_parse("chart-bump/v6.2.0").await.is_err());
        assert!(remote.rev_parse("chart-bump/v6.2.0").await.is_err());
        assert_eq!(ChartVersionFile::read(git.workdir()).unwrap(), v("6.1.0"));
    }

    #[tokio::test]
    async fn test_apply_bump_ignores_other_decisions() {
        let (_dir, git) = init_repo().await;
        let host = RecordingHost::default();

        for decision in [
            BumpDecision::NoUpstreamRelease,
            BumpDecision::UpToDate,
            BumpDecision::PullRequestOpen { number: 3 },
        ] {
            let created = apply_bump(&host, &git, &target(), &v("6.1.0"), &decision, false)
                .await
                .unwrap();
            assert_eq!(created, None);
        }
        assert!(host.calls().is_empty());
    }
}
