//! Remote forge access.
//!
//! One [`Forge`] adapter per product. The orchestrators only see the trait, so
//! supporting another forge means adding an adapter here.

use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};

use crate::config::BackporterConfig;
use crate::error::{BackportError, BackportResult};
use crate::types::{CommitInfo, PullRequestInfo, RepoSlug};

mod forgejo;
mod github;
mod http;
#[cfg(test)]
mod test_server;
mod wire;

pub use forgejo::Forgejo;
pub use github::{GITHUB_API, GitHub};

/// Supported forge products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeKind {
    GitHub,
    /// Forgejo and Gitea share one API.
    Forgejo,
}

impl ForgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForgeKind::GitHub => "github",
            ForgeKind::Forgejo => "forgejo",
        }
    }
}

impl fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForgeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ForgeKind::GitHub),
            "forgejo" | "gitea" => Ok(ForgeKind::Forgejo),
            other => bail!("unknown forge type: {other} (expected github or forgejo)"),
        }
    }
}

/// Pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Pull request state on a remote forge.
pub trait Forge {
    fn name(&self) -> &'static str;

    /// Fetch a merged pull request. Errors if it is not merged.
    fn get_pull_request(&self, slug: &RepoSlug, number: u64) -> Result<PullRequestInfo>;

    fn get_commit(&self, slug: &RepoSlug, sha: &str) -> Result<CommitInfo>;

    /// Recently merged pull requests, most recent first.
    fn list_recent_pull_requests(
        &self,
        slug: &RepoSlug,
        limit: usize,
    ) -> Result<Vec<PullRequestInfo>>;

    /// Open pull requests, restricted to those whose head branch is `head`.
    fn list_open_pull_requests(
        &self,
        slug: &RepoSlug,
        head: Option<&str>,
    ) -> Result<Vec<PullRequestInfo>>;

    /// Open a pull request and return its number.
    fn create_pull_request(&self, slug: &RepoSlug, request: &NewPullRequest) -> Result<u64>;
}

/// API token for `kind` from the environment.
pub fn token_from_env(kind: ForgeKind) -> Option<String> {
    let read = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
    match kind {
        ForgeKind::GitHub => read("GITHUB_TOKEN"),
        ForgeKind::Forgejo => read("FORGEJO_TOKEN").or_else(|| read("GITEA_TOKEN")),
    }
}

/// Build the adapter selected by `forge_type`.
pub fn from_config(
    config: &BackporterConfig,
    token: Option<String>,
) -> BackportResult<Box<dyn Forge>> {
    let Some(kind) = config.forge_kind()? else {
        return Err(BackportError::ForgeNotConfigured(
            "forge_type is not set".to_string(),
        ));
    };

    match kind {
        ForgeKind::GitHub => {
            let forge = GitHub::new(&config.github_api_url, token, config.http_timeout)?;
            Ok(Box::new(forge))
        }
        ForgeKind::Forgejo => {
            let base = config
                .forgejo_url
                .clone()
                .or_else(|| env::var("FORGEJO_URL").ok())
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| {
                    BackportError::ForgeNotConfigured(
                        "forgejo_url is not set (config or FORGEJO_URL)".to_string(),
                    )
                })?;
            let forge = Forgejo::new(&base, token, config.http_timeout)?;
            Ok(Box::new(forge))
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn forge_kind_parses_aliases() {
        assert_eq!("github".parse::<ForgeKind>().expect("kind"), ForgeKind::GitHub);
        assert_eq!("GitHub".parse::<ForgeKind>().expect("kind"), ForgeKind::GitHub);
        assert_eq!("forgejo".parse::<ForgeKind>().expect("kind"), ForgeKind::Forgejo);
        assert_eq!("gitea".parse::<ForgeKind>().expect("kind"), ForgeKind::Forgejo);
        assert!("gitlab".parse::<ForgeKind>().is_err());
    }

    #[test]
    fn missing_forge_type_is_not_configured() {
        let config = BackporterConfig::default();
        let err = from_config(&config, None).err().expect("must fail");
        assert!(matches!(err, BackportError::ForgeNotConfigured(_)));
    }

    #[test]
    fn github_adapter_from_config() {
        let config = BackporterConfig {
            forge_type: Some("github".to_string()),
            ..BackporterConfig::default()
        };
        let forge = from_config(&config, Some("t".into())).expect("forge");
        assert_eq!(forge.name(), "github");
    }

    #[test]
    #[serial]
    fn forgejo_requires_base_url() {
        let config = BackporterConfig {
            forge_type: Some("forgejo".to_string()),
            ..BackporterConfig::default()
        };
        temp_env::with_var_unset("FORGEJO_URL", || {
            let err = from_config(&config, None).err().expect("must fail");
            assert!(matches!(err, BackportError::ForgeNotConfigured(_)));
        });
        temp_env::with_var("FORGEJO_URL", Some("https://codeberg.org"), || {
            let forge = from_config(&config, None).expect("forge");
            assert_eq!(forge.name(), "forgejo");
        });
    }

    #[test]
    #[serial]
    fn forgejo_token_falls_back_to_gitea() {
        temp_env::with_vars(
            [("FORGEJO_TOKEN", None), ("GITEA_TOKEN", Some("gitea-secret"))],
            || {
                assert_eq!(
                    token_from_env(ForgeKind::Forgejo).as_deref(),
                    Some("gitea-secret")
                );
            },
        );
        temp_env::with_vars(
            [("FORGEJO_TOKEN", Some("fj")), ("GITEA_TOKEN", Some("gitea-secret"))],
            || {
                assert_eq!(token_from_env(ForgeKind::Forgejo).as_deref(), Some("fj"));
            },
        );
    }

    #[test]
    #[serial]
    fn empty_github_token_is_ignored() {
        temp_env::with_var("GITHUB_TOKEN", Some(""), || {
            assert_eq!(token_from_env(ForgeKind::GitHub), None);
        });
    }
}
