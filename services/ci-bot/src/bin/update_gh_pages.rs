//! GitHub Pages Status Updater
//!
//! Rebuilds the status page listing the commit deployed to every environment
//! and commits it to the checked-out `gh-pages` branch.
//!
//! ## Usage
//! ```bash
//! GITHUB_REPOSITORY=nmshd/backbone-helm \
//! GITHUB_TOKEN=<TOKEN> \
//! update-gh-pages --pages-dir gh-pages
//! ```

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use ci_bot::pages::{
    environment_details, write_site, EnvironmentDetails, CONFIG_FILE, ENVIRONMENTS, INDEX_FILE,
};
use ci_bot::{logging, Config, GitCli, Namespace};

/// GitHub Pages Status Updater
#[derive(Parser, Debug)]
#[command(name = "update-gh-pages")]
#[command(about = "Regenerate the deployment status page")]
#[command(version)]
struct Args {
    /// Path of the git working copy holding the version tags
    #[arg(long, default_value = ".")]
    repo_dir: String,

    /// Directory of the checked-out gh-pages branch
    #[arg(long, default_value = "gh-pages")]
    pages_dir: String,

    /// Environments to list (comma-separated)
    #[arg(long, value_delimiter = ',', default_values = ENVIRONMENTS)]
    environments: Vec<Namespace>,

    /// Remote to fetch tags from
    #[arg(long, default_value = "origin")]
    remote: String,

    /// Ref the "behind main" count is measured against
    #[arg(long, default_value = "origin/main")]
    main_ref: String,

    /// Skip fetching tags before reading them
    #[arg(long)]
    no_fetch: bool,

    /// Write the files but don't commit them
    #[arg(long)]
    no_commit: bool,

    /// Output format: text (default), json
    #[arg(long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct PagesSummary {
    repository: String,
    environments: Vec<EnvironmentDetails>,
    committed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose, args.format == "json")?;

    let config = Config::from_env()?;
    let git = GitCli::new(&args.repo_dir);

    if !args.no_fetch {
        git.fetch_tags(&args.remote).await?;
    }
    let tags = git.list_tags().await?;

    let mut rows = Vec::with_capacity(args.environments.len());
    for env in &args.environments {
        let details =
            environment_details(&git, &tags, env, &config.repository, &args.main_ref).await?;
        rows.push(details);
    }

    let pages_dir = Path::new(&args.pages_dir);
    write_site(
        pages_dir,
        &config.repository.name,
        &rows,
        Local::now().date_naive(),
    )?;

    let committed = if args.no_commit {
        false
    } else {
        GitCli::new(pages_dir)
            .commit_paths(&[CONFIG_FILE, INDEX_FILE], "Update github pages")
            .await?
    };
    info!(committed, "GitHub pages updated");

    match args.format.as_str() {
        "json" => {
            let summary = PagesSummary {
                repository: config.repository.to_string(),
                environments: rows,
                committed,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            for row in &rows {
                match &row.deployment {
                    Some(d) => println!(
                        "{:<6} {:<10} {} ({} behind main)",
                        row.env,
                        d.tag,
                        d.short_hash(),
                        d.behind_main
                    ),
                    None => println!("{:<6} not deployed", row.env),
                }
            }
        }
    }

    Ok(())
}
