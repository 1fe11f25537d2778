//! Git CLI Wrapper
//!
//! Runs the `git` binary in a working directory. Every failing command is
//! reported with its arguments and stderr; nothing is retried.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Git repository accessed through the `git` command line
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run a git command and return its trimmed stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(workdir = %self.workdir.display(), "git {}", args.join(" "));

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "git {} failed ({}): {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8(output.stdout)
            .context("git produced non UTF-8 output")?
            .trim()
            .to_string())
    }

    /// Fetch all tags from `remote`, replacing local tags that moved
    pub async fn fetch_tags(&self, remote: &str) -> Result<()> {
        self.run(&["fetch", remote, "--tags", "--force"]).await?;
        Ok(())
    }

    pub async fn list_tags(&self) -> Result<Vec<String>> {
        let output = self.run(&["tag", "-l"]).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Create an annotated tag at HEAD
    pub async fn create_annotated_tag(&self, name: &str, message: &str) -> Result<()> {
        self.run(&["tag", "-a", name, "-m", message]).await?;
        Ok(())
    }

    /// Push a ref to `remote`, overwriting the remote ref if it already exists
    pub async fn force_push_ref(&self, remote: &str, name: &str) -> Result<()> {
        self.run(&["push", remote, name, "--force"]).await?;
        Ok(())
    }

    /// Resolve a revision (tag, branch, sha) to the full commit hash
    pub async fn rev_parse(&self, rev: &str) -> Result<String> {
        let spec = format!("{}^{{commit}}", rev);
        self.run(&["rev-parse", "--verify", "--quiet", &spec])
            .await
            .with_context(|| format!("Unknown revision: {}", rev))
    }

    pub async fn commit_subject(&self, rev: &str) -> Result<String> {
        self.run(&["log", "-1", "--format=%s", rev]).await
    }

    pub async fn commit_date(&self, rev: &str) -> Result<DateTime<FixedOffset>> {
        let raw = self.run(&["log", "-1", "--format=%cI", rev]).await?;
        DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("Failed to parse commit date '{}' of {}", raw, rev))
    }

    /// Number of commits reachable from `to` but not from `from`
    pub async fn count_commits_between(&self, from: &str, to: &str) -> Result<u64> {
        let range = format!("{}..{}", from, to);
        let raw = self.run(&["rev-list", "--count", &range]).await?;
        raw.parse()
            .with_context(|| format!("Unexpected rev-list output: {}", raw))
    }

    pub async fn checkout_new_branch(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-b", name]).await?;
        Ok(())
    }

    /// Stage `paths` and commit them.
    ///
    /// Returns `false` without committing when nothing changed.
    pub async fn commit_paths(&self, paths: &[&str], message: &str) -> Result<bool> {
        let mut add = vec!["add", "--"];
        add.extend_from_slice(paths);
        self.run(&add).await?;

        let staged = self.run(&["diff", "--cached", "--name-only"]).await?;
        if staged.is_empty() {
            debug!("Nothing to commit");
            return Ok(false);
        }

        self.run(&["commit", "-m", message]).await?;
        Ok(true)
    }

    pub async fn push_branch(&self, remote: &str, name: &str) -> Result<()> {
        self.run(&["push", "--set-upstream", remote, name]).await?;
        Ok(())
    }
}
