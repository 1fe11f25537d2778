//! Helm Chart Version
//!
//! The packaged upstream chart version lives in `chart-version.txt`. Versions
//! are also recovered from upstream release tags (`helm/<version>`) and from
//! the titles of bump pull requests (`... v<major>.<minor>.<patch>`).

use anyhow::{Context, Result};
use regex::Regex;
use semver::Version;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

use crate::git::GitCli;

/// Release tag prefix used by upstream Helm chart releases
pub const RELEASE_TAG_PREFIX: &str = "helm/";

/// Branch prefix for automated bump pull requests
pub const BUMP_BRANCH_PREFIX: &str = "chart-bump/";

pub struct ChartVersionFile;

impl ChartVersionFile {
    pub const NAME: &'static str = "chart-version.txt";

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(Self::NAME)
    }

    pub fn read(dir: &Path) -> Result<Version> {
        let path = Self::path(dir);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_version(raw.trim())
            .with_context(|| format!("Invalid chart version in {}", path.display()))
    }

    pub fn write(dir: &Path, version: &Version) -> Result<()> {
        let path = Self::path(dir);
        fs::write(&path, format!("{}\n", version))
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Parse a version with an optional leading `v`
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.strip_prefix('v').unwrap_or(raw);
    Version::parse(trimmed).with_context(|| format!("Not a semantic version: {}", raw))
}

/// Version of an upstream release tag such as `helm/6.2.0`
pub fn version_from_release_tag(tag: &str, prefix: &str) -> Option<Version> {
    tag.strip_prefix(prefix)
        .and_then(|rest| parse_version(rest).ok())
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"v([0-9]+\.[0-9]+\.[0-9]+)$").expect("title pattern is valid")
    })
}

/// Version at the end of a bump PR title (`Bump Helm chart to v6.2.0`)
pub fn version_from_pr_title(title: &str) -> Option<Version> {
    let captures = title_pattern().captures(title.trim_end())?;
    Version::parse(&captures[1]).ok()
}

pub fn bump_title(version: &Version) -> String {
    format!("Bump Helm chart to v{}", version)
}

pub fn bump_branch(version: &Version) -> String {
    format!("{}v{}", BUMP_BRANCH_PREFIX, version)
}

/// Commit `version` to `chart-version.txt` on a new bump branch and push it.
///
/// Returns the branch name.
pub async fn push_bump_branch(git: &GitCli, remote: &str, version: &Version) -> Result<String> {
    let branch = bump_branch(version);
    git.checkout_new_branch(&branch).await?;
    ChartVersionFile::write(git.workdir(), version)?;
    git.commit_paths(&[ChartVersionFile::NAME], &bump_title(version))
        .await?;
    git.push_branch(remote, &branch)
        .await
        .with_context(|| format!("Failed to push {}", branch))?;
    info!(branch = %branch, remote = %remote, "Pushed bump branch");
    Ok(branch)
}
