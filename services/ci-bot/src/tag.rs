//! Environment Version Tags
//!
//! Allocates incrementing, namespaced tag names of the form `<namespace>-<n>`
//! (e.g. `dev-2`, `stage-4`) from the set of tags that already exist.
//!
//! Tag names are split on the first `-` only, so `dev-stage-3` belongs to the
//! `dev` namespace with the non-numeric suffix `stage-3` and is ignored.
//!
//! Allocation itself is pure. [`mint`] wraps it with the git fetch, tag and
//! push steps.

use anyhow::Context;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::git::GitCli;

/// Separator between namespace and numeric suffix
pub const SEPARATOR: char = '-';

/// Errors produced while allocating a tag
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("Tag namespace must not be empty")]
    EmptyNamespace,

    #[error("Tag namespace '{0}' must not contain '-'")]
    SeparatorInNamespace(String),

    #[error("Tag namespace {0:?} is not valid in a git ref name")]
    InvalidRefName(String),

    #[error("Tag namespace '{0}' has reached the maximum suffix {max}", max = u64::MAX)]
    SuffixOverflow(String),
}

/// Characters git refuses anywhere in a ref name
const FORBIDDEN_REF_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// A validated tag namespace (e.g. an environment name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validate a namespace: non-empty, free of the separator and usable as
    /// the start of a git tag name
    pub fn new(name: impl Into<String>) -> Result<Self, TagError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TagError::EmptyNamespace);
        }
        if name.contains(SEPARATOR) {
            return Err(TagError::SeparatorInNamespace(name));
        }
        if !is_ref_safe(&name) {
            return Err(TagError::InvalidRefName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the tag for a given suffix
    pub fn tag(&self, suffix: u64) -> String {
        format!("{}{}{}", self.0, SEPARATOR, suffix)
    }
}

impl FromStr for Namespace {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rules of `git check-ref-format` that a `<namespace>-<n>` tag can break.
/// The suffix always ends the name in a digit, so only the namespace side
/// needs checking.
fn is_ref_safe(name: &str) -> bool {
    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_REF_CHARS.contains(&c))
    {
        return false;
    }
    if name.contains("..") || name.contains("@{") || name.contains("//") || name.contains("/.") {
        return false;
    }
    // Every component but the last is complete before the suffix is appended
    if name.rsplit('/').skip(1).any(|part| part.ends_with(".lock")) {
        return false;
    }
    !(name.starts_with('.') || name.starts_with('/') || name.ends_with('/'))
}

/// Extract the numeric suffix of `tag` if it belongs to `namespace`.
///
/// Only plain ASCII digits are accepted: `dev--1` and `dev-+2` do not match.
/// Suffixes too large for a `u64` are treated as non-numeric.
pub fn parse_suffix(tag: &str, namespace: &Namespace) -> Option<u64> {
    let (prefix, remainder) = tag.split_once(SEPARATOR)?;
    if prefix != namespace.as_str() {
        return None;
    }
    if remainder.is_empty() || !remainder.bytes().all(|b| b.is_ascii_digit()) {
        debug!(tag = %tag, "Ignoring tag with non-numeric suffix");
        return None;
    }
    match remainder.parse() {
        Ok(suffix) => Some(suffix),
        Err(_) => {
            debug!(tag = %tag, "Ignoring tag with suffix beyond u64");
            None
        }
    }
}

/// Compute the next tag name in `namespace`.
///
/// Returns `<namespace>-1` when the namespace has no numeric tags yet,
/// otherwise one more than the highest suffix present. Gaps are not filled.
pub fn next_tag<S: AsRef<str>>(existing_tags: &[S], namespace: &str) -> Result<String, TagError> {
    let namespace = Namespace::new(namespace)?;
    next_tag_in(existing_tags, &namespace)
}

/// Same as [`next_tag`] for an already validated namespace
pub fn next_tag_in<S: AsRef<str>>(
    existing_tags: &[S],
    namespace: &Namespace,
) -> Result<String, TagError> {
    let highest = existing_tags
        .iter()
        .filter_map(|tag| parse_suffix(tag.as_ref(), namespace))
        .max();

    let next = match highest {
        Some(n) => n
            .checked_add(1)
            .ok_or_else(|| TagError::SuffixOverflow(namespace.to_string()))?,
        None => 1,
    };

    Ok(namespace.tag(next))
}

/// Find the existing tag with the highest suffix in `namespace`.
///
/// On ties (`dev-7` and `dev-07`) the first one in `existing_tags` wins.
pub fn latest_tag<S: AsRef<str>>(
    existing_tags: &[S],
    namespace: &Namespace,
) -> Option<String> {
    let mut latest: Option<(u64, &str)> = None;
    for tag in existing_tags {
        let tag = tag.as_ref();
        if let Some(suffix) = parse_suffix(tag, namespace) {
            if latest.map_or(true, |(best, _)| suffix > best) {
                latest = Some((suffix, tag));
            }
        }
    }
    latest.map(|(_, tag)| tag.to_string())
}

// ============================================================
// Minting
// ============================================================

/// Outcome of a [`mint`] run
#[derive(Debug, Clone, Serialize)]
pub struct MintedTag {
    pub namespace: String,
    pub tag: String,
    /// Number of tags present after fetching
    pub existing: usize,
    pub pushed: bool,
}

/// Fetch tags from `remote`, allocate the next tag in `namespace` and,
/// unless `dry_run`, create it on HEAD and force-push it.
pub async fn mint(
    git: &GitCli,
    namespace: &Namespace,
    remote: &str,
    dry_run: bool,
) -> anyhow::Result<MintedTag> {
    info!(remote = %remote, "Fetching tags");
    git.fetch_tags(remote).await?;
    let existing_tags = git.list_tags().await?;

    let tag = next_tag_in(&existing_tags, namespace)?;
    info!(
        namespace = %namespace,
        existing = existing_tags.len(),
        tag = %tag,
        "Computed next version tag"
    );

    if dry_run {
        warn!("DRY RUN - not creating {}", tag);
    } else {
        git.create_annotated_tag(&tag, &tag)
            .await
            .with_context(|| format!("Failed to create tag {}", tag))?;
        git.force_push_ref(remote, &tag)
            .await
            .with_context(|| format!("Failed to push tag {}", tag))?;
        info!(tag = %tag, remote = %remote, "Tag pushed");
    }

    Ok(MintedTag {
        namespace: namespace.to_string(),
        tag,
        existing: existing_tags.len(),
        pushed: !dry_run,
    })
}
