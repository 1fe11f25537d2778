//! Process Configuration
//!
//! Required settings are read once at start-up and passed to whatever needs
//! them. A missing value is a fatal configuration error raised before any
//! git or GitHub call is made.

use std::env;
use thiserror::Error;

use crate::tag::{Namespace, TagError};

pub const GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const GIT_TAG: &str = "GIT_TAG";

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid repository format: {0}. Expected: owner/repo")]
    InvalidRepository(String),

    #[error("Invalid tag namespace in GIT_TAG: {0}")]
    InvalidNamespace(#[from] TagError),
}

/// A GitHub repository identifier (`owner/repo`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(ConfigError::InvalidRepository(value.to_string())),
        }
    }
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Settings shared by every tool that talks to GitHub
#[derive(Clone)]
pub struct Config {
    pub repository: Repository,
    pub token: String,
    pub api_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("repository", &self.repository)
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let repository = Repository::parse(&required(&lookup, GITHUB_REPOSITORY)?)?;
        let token = required(&lookup, GITHUB_TOKEN)?;
        let api_url = lookup(GITHUB_API_URL)
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            repository,
            token,
            api_url,
        })
    }
}

/// Settings for minting environment version tags
#[derive(Debug, Clone)]
pub struct TagConfig {
    /// Namespace requested by the trigger (e.g. `dev`)
    pub namespace: Namespace,
}

impl TagConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = Namespace::new(required(&lookup, GIT_TAG)?)?;
        Ok(Self { namespace })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}
