//! Helm Chart Bump Tool
//!
//! Compares the packaged chart version (`chart-version.txt`) with the newest
//! upstream `helm/*` release and opens a bump pull request when upstream is
//! ahead and no bump PR for that version is open yet.
//!
//! ## Usage
//! ```bash
//! GITHUB_REPOSITORY=nmshd/backbone-helm \
//! GITHUB_TOKEN=<TOKEN> \
//! chart-bump --upstream nmshd/backbone
//!
//! # Only report what would happen
//! chart-bump --dry-run --format json
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::info;

use ci_bot::chart::{ChartVersionFile, RELEASE_TAG_PREFIX};
use ci_bot::pr::{
    apply_bump, find_open_bump, latest_upstream_version, plan_bump, BumpDecision, BumpInputs,
    BumpSummary, BumpTarget, DEFAULT_BOT_LOGIN,
};
use ci_bot::{logging, Config, GitCli, GitHubClient, Repository};

/// Helm Chart Bump Tool
#[derive(Parser, Debug)]
#[command(name = "chart-bump")]
#[command(about = "Open a pull request when upstream publishes a new Helm chart")]
#[command(version)]
struct Args {
    /// Upstream repository publishing the chart releases (owner/repo)
    #[arg(long, default_value = "nmshd/backbone")]
    upstream: String,

    /// Release tag prefix of chart releases
    #[arg(long, default_value = RELEASE_TAG_PREFIX)]
    tag_prefix: String,

    /// Login of the bot that authors bump pull requests
    #[arg(long, default_value = DEFAULT_BOT_LOGIN)]
    bot_login: String,

    /// Branch the bump pull request targets
    #[arg(long, default_value = "main")]
    base: String,

    /// Path of the git working copy
    #[arg(long, default_value = ".")]
    repo_dir: String,

    /// Remote to push the bump branch to
    #[arg(long, default_value = "origin")]
    remote: String,

    /// Output format: text (default), json
    #[arg(long, default_value = "text")]
    format: String,

    /// Dry run - report the decision without touching branches or PRs
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose, args.format == "json")?;

    let config = Config::from_env()?;
    let upstream_repo = Repository::parse(&args.upstream)?;
    let github = GitHubClient::from_config(&config)?;
    let git = GitCli::new(&args.repo_dir);

    let current = ChartVersionFile::read(Path::new(&args.repo_dir))?;

    let pulls = github.list_open_pull_requests(&config.repository).await?;
    let open_bump = find_open_bump(&pulls, &args.bot_login);

    let releases = github
        .list_releases_with_tag_prefix(&upstream_repo, &args.tag_prefix)
        .await?;
    let upstream = latest_upstream_version(&releases, &args.tag_prefix);

    let branches = github
        .list_branches(&config.repository)
        .await?
        .into_iter()
        .map(|branch| branch.name)
        .collect();

    info!(
        file = %current,
        pr = %open_bump.as_ref().map_or("no-pr".to_string(), |b| b.version.to_string()),
        upstream = %upstream.as_ref().map_or("no-release".to_string(), |v| v.to_string()),
        "Chart versions"
    );

    let inputs = BumpInputs {
        current: current.clone(),
        open_bump: open_bump.clone(),
        upstream: upstream.clone(),
        branches,
    };
    let decision = plan_bump(&inputs);
    info!(decision = ?decision, "Bump decision");

    let target = BumpTarget {
        repository: config.repository.clone(),
        upstream: args.upstream.clone(),
        base: args.base.clone(),
        remote: args.remote.clone(),
    };
    let created_pull_request =
        apply_bump(&github, &git, &target, &current, &decision, args.dry_run).await?;

    let summary = BumpSummary {
        repository: config.repository.to_string(),
        current,
        open_bump,
        upstream,
        decision,
        created_pull_request,
        dry_run: args.dry_run,
    };

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => match (&summary.decision, summary.created_pull_request) {
            (BumpDecision::NoUpstreamRelease, _) => println!("No upstream chart release found"),
            (BumpDecision::UpToDate, _) => println!("Chart v{} is up to date", summary.current),
            (BumpDecision::PullRequestOpen { number }, _) => {
                println!("Bump PR #{} is already open", number)
            }
            (BumpDecision::OpenPullRequest { version, .. }, Some(number)) => {
                println!("Opened PR #{} bumping chart to v{}", number, version)
            }
            (BumpDecision::OpenPullRequest { version, .. }, None) => {
                println!("Would open PR bumping chart to v{}", version)
            }
        },
    }

    Ok(())
}
