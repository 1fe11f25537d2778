//! Environment Version Tag Tool
//!
//! Mints the next tag of an environment namespace (`dev-1`, `dev-2`, ...)
//! on HEAD and force-pushes it.
//!
//! ## Usage
//! ```bash
//! # Namespace from the trigger
//! GIT_TAG=dev version-tag
//!
//! # Only print the tag that would be created
//! GIT_TAG=stage version-tag --dry-run
//! ```
//!
//! The push is forced: two concurrent runs for the same namespace can compute
//! the same name and the later push wins. Serialize runs per namespace (e.g.
//! with a CI concurrency group) when that matters.

use anyhow::Result;
use clap::Parser;

use ci_bot::tag::mint;
use ci_bot::{logging, GitCli, TagConfig};

/// Environment Version Tag Tool
#[derive(Parser, Debug)]
#[command(name = "version-tag")]
#[command(about = "Create and push the next <env>-<n> version tag")]
#[command(version)]
struct Args {
    /// Path of the git working copy
    #[arg(long, default_value = ".")]
    repo_dir: String,

    /// Remote to fetch tags from and push to
    #[arg(long, default_value = "origin")]
    remote: String,

    /// Output format: text (default), json
    #[arg(long, default_value = "text")]
    format: String,

    /// Dry run - compute the tag but don't create or push it
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

    let config = TagConfig::from_env()?;
    let git = GitCli::new(&args.repo_dir);

    let minted = mint(&git, &config.namespace, &args.remote, args.dry_run).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&minted)?),
        _ => println!("{}", minted.tag),
    }

    Ok(())
}
