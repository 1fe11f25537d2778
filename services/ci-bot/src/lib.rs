//! CI Bot Tools Library
//!
//! Rust utilities for the chart repository's CI pipelines.
//!
//! ## Binaries
//!
//! - `version-tag`: Mint the next `<env>-<n>` tag and force-push it
//! - `chart-bump`: Open a pull request when upstream publishes a new Helm chart
//! - `update-gh-pages`: Regenerate the deployment status page
//!
//! ## Example Pipeline
//!
//! ```bash
//! # Tag the current commit as the next dev deployment
//! GIT_TAG=dev version-tag
//!
//! # Check for a new upstream chart and open a bump PR
//! GITHUB_REPOSITORY=nmshd/backbone-helm \
//! GITHUB_TOKEN=$TOKEN \
//! chart-bump --format json
//!
//! # Refresh the status page on the gh-pages worktree
//! update-gh-pages --pages-dir gh-pages
//! ```

pub mod chart;
pub mod config;
pub mod git;
pub mod github;
pub mod logging;
pub mod pages;
pub mod pr;
pub mod tag;

pub use config::{Config, ConfigError, Repository, TagConfig};
pub use git::GitCli;
pub use github::GitHubClient;
pub use tag::{next_tag, Namespace, TagError};
