use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::forge::ForgeKind;

/// Which automation system the process is running under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiProvider {
    GitHubActions,
    ForgejoActions,
    Generic,
}

impl fmt::Display for CiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CiProvider::GitHubActions => "GitHub Actions",
            CiProvider::ForgejoActions => "Forgejo Actions",
            CiProvider::Generic => "CI",
        };
        f.write_str(name)
    }
}

/// Detect the CI provider from the process environment.
pub fn detect_ci() -> Option<CiProvider> {
    detect_ci_with(|key| env::var(key).ok())
}

/// Detect the CI provider through an arbitrary variable lookup.
pub fn detect_ci_with(lookup: impl Fn(&str) -> Option<String>) -> Option<CiProvider> {
    let set = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());

    if set("GITHUB_ACTIONS") {
        Some(CiProvider::GitHubActions)
    } else if set("FORGEJO_ACTIONS") || set("GITEA_ACTIONS") {
        Some(CiProvider::ForgejoActions)
    } else if set("CI") {
        Some(CiProvider::Generic)
    } else {
        None
    }
}

/// Author identity used for commits made by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// The bot identity each forge's actions runner commits as.
    pub fn default_for(kind: ForgeKind) -> Self {
        match kind {
            ForgeKind::GitHub => Self::new(
                "github-actions[bot]",
                "41898282+github-actions[bot]@users.noreply.github.com",
            ),
            ForgeKind::Forgejo => {
                Self::new("forgejo-actions[bot]", "forgejo-actions@noreply.localhost")
            }
        }
    }
}
