//! GitHub Pages Status Page
//!
//! Regenerates the Jekyll site that shows which commit is deployed to each
//! environment. The deployed commit of an environment is the one carrying its
//! latest version tag (`dev-7`, `prod-3`, ...).

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::Repository;
use crate::git::GitCli;
use crate::tag::{latest_tag, Namespace};

/// Environments listed on the status page, in display order
pub const ENVIRONMENTS: [&str; 4] = ["dev", "stage", "prod", "bird"];

pub const CONFIG_FILE: &str = "_config.yml";
pub const CONFIG_STUB_FILE: &str = "_config.stub.yml";
pub const INDEX_FILE: &str = "index.markdown";
pub const INDEX_STUB_FILE: &str = "index.stub.markdown";

const SHORT_HASH_LEN: usize = 7;

/// Commit currently deployed to an environment
#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub tag: String,
    pub hash: String,
    pub url: String,
    pub message: String,
    pub date: DateTime<FixedOffset>,
    pub behind_main: u64,
}

impl Deployment {
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(SHORT_HASH_LEN)]
    }
}

/// One row of the status table
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentDetails {
    pub env: String,
    /// `None` when the environment has never been tagged
    pub deployment: Option<Deployment>,
}

pub fn commit_url(repo: &Repository, hash: &str) -> String {
    format!("https://github.com/{}/{}/commit/{}", repo.owner, repo.name, hash)
}

/// Collect deployment details for `env` from the repository tags
pub async fn environment_details(
    git: &GitCli,
    tags: &[String],
    env: &Namespace,
    repo: &Repository,
    main_ref: &str,
) -> Result<EnvironmentDetails> {
    let Some(tag) = latest_tag(tags, env) else {
        warn!(env = %env, "Environment has no version tag");
        return Ok(EnvironmentDetails {
            env: env.to_string(),
            deployment: None,
        });
    };

    let hash = git.rev_parse(&tag).await?;
    let message = git.commit_subject(&hash).await?;
    let date = git.commit_date(&hash).await?;
    let behind_main = git.count_commits_between(&hash, main_ref).await?;

    debug!(env = %env, tag = %tag, hash = %hash, behind_main, "Resolved deployment");

    Ok(EnvironmentDetails {
        env: env.to_string(),
        deployment: Some(Deployment {
            url: commit_url(repo, &hash),
            tag,
            hash,
            message,
            date,
            behind_main,
        }),
    })
}

/// Markdown table cells must not contain raw pipes or newlines
fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn table_row(details: &EnvironmentDetails) -> String {
    match &details.deployment {
        Some(d) => format!(
            "| {} | [{}]({}) | {} | {} | {} |\n",
            details.env,
            d.short_hash(),
            d.url,
            escape_cell(&d.message),
            d.date.format("%Y-%m-%d %H:%M %:z"),
            d.behind_main
        ),
        None => format!("| {} | - | - | - | - |\n", details.env),
    }
}

fn with_trailing_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

pub fn render_config(stub: &str, repo_name: &str, updated: NaiveDate) -> String {
    format!(
        "{}\nbaseurl: /{}\ndescription: Last updated on {}\n",
        stub.trim_end(),
        repo_name,
        updated.format("%a %b %d %Y")
    )
}

pub fn render_index(stub: &str, rows: &[EnvironmentDetails]) -> String {
    let mut index = with_trailing_newline(stub.to_string());
    for row in rows {
        index.push_str(&table_row(row));
    }
    index
}

/// Rewrite `_config.yml` and `index.markdown` from their stubs
pub fn write_site(
    dir: &Path,
    repo_name: &str,
    rows: &[EnvironmentDetails],
    updated: NaiveDate,
) -> Result<()> {
    let read = |name: &str| {
        let path = dir.join(name);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    };

    let config = render_config(&read(CONFIG_STUB_FILE)?, repo_name, updated);
    let index = render_index(&read(INDEX_STUB_FILE)?, rows);

    fs::write(dir.join(CONFIG_FILE), config)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE))?;
    fs::write(dir.join(INDEX_FILE), index)
        .with_context(|| format!("Failed to write {}", INDEX_FILE))?;

    info!(dir = %dir.display(), environments = rows.len(), "Status page written");
    Ok(())
}
