//! Configuration file support (`.backporter.toml`).
//!
//! Files are layered: built-in defaults, then the global file under the user
//! config directory, then `.backporter.toml` in the repository root, then an
//! explicit `--config` path. A later file overrides a value only when it sets
//! it to something non-empty.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::environment::CommitIdentity;
use crate::forge::{ForgeKind, GITHUB_API};
use crate::targets::TargetBranchSpec;

/// File name looked up in the repository root.
pub const REPO_CONFIG_FILE: &str = ".backporter.toml";

/// Effective, fully-defaulted configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackporterConfig {
    /// `github` or `forgejo`; `None` disables forge features.
    pub forge_type: Option<String>,
    pub forgejo_url: Option<String>,
    pub github_api_url: String,
    /// Literal branch names or regex patterns.
    pub target_branches: Vec<String>,
    pub default_branch: String,
    pub remote: String,
    pub recent_pr_count: usize,
    pub http_timeout: Duration,
    pub history: HistoryConfig,
    pub ci: CiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Ledger location; defaults to the user cache directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiConfig {
    /// Conventional-commit type used when the PR title has none.
    pub default_prefix: String,
    /// Longest original description copied into a backport PR.
    pub body_max_len: usize,
    pub identity_name: Option<String>,
    pub identity_email: Option<String>,
}

impl Default for BackporterConfig {
    fn default() -> Self {
        Self {
            forge_type: None,
            forgejo_url: None,
            github_api_url: GITHUB_API.to_string(),
            target_branches: Vec::new(),
            default_branch: "main".to_string(),
            remote: "origin".to_string(),
            recent_pr_count: 10,
            http_timeout: Duration::from_secs(30),
            history: HistoryConfig {
                enabled: true,
                path: None,
            },
            ci: CiConfig {
                default_prefix: "fix".to_string(),
                body_max_len: 2000,
                identity_name: None,
                identity_email: None,
            },
        }
    }
}

/// One configuration file as written on disk. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub forge_type: Option<String>,
    #[serde(default)]
    pub forgejo_url: Option<String>,
    #[serde(default)]
    pub github_api_url: Option<String>,
    #[serde(default)]
    pub target_branches: Option<Vec<String>>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub recent_pr_count: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub http_timeout: Option<Duration>,
    #[serde(default)]
    pub history: Option<HistoryFile>,
    #[serde(default)]
    pub ci: Option<CiFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryFile {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CiFile {
    #[serde(default)]
    pub default_prefix: Option<String>,
    #[serde(default)]
    pub body_max_len: Option<usize>,
    #[serde(default)]
    pub identity: Option<IdentityFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl ConfigFile {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// `Ok(None)` when the file does not exist.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(path).map(Some)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Global configuration file under the user config directory.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("backporter").join("config.toml"))
}

/// Default ledger location under the user cache directory.
pub fn default_history_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("backporter").join("history.json"))
}

impl BackporterConfig {
    /// Load the global file, the repository file and an optional explicit
    /// file, in that order.
    pub fn load(repo_root: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let global = global_config_path();
        let repo = repo_root.map(|root| root.join(REPO_CONFIG_FILE));
        Self::load_layers(global.as_deref(), repo.as_deref(), explicit)
    }

    /// Missing global and repository files are skipped; a missing explicit
    /// file is an error.
    pub fn load_layers(
        global: Option<&Path>,
        repo: Option<&Path>,
        explicit: Option<&Path>,
    ) -> Result<Self> {
        let mut config = Self::default();
        for path in [global, repo].into_iter().flatten() {
            if let Some(file) = ConfigFile::load_optional(path)? {
                config.merge(file);
            }
        }
        if let Some(path) = explicit {
            config.merge(ConfigFile::load_from_file(path)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Overlay the values `file` sets.
    pub fn merge(&mut self, file: ConfigFile) {
        if let Some(v) = non_empty(file.forge_type) {
            self.forge_type = Some(v);
        }
        if let Some(v) = non_empty(file.forgejo_url) {
            self.forgejo_url = Some(v);
        }
        if let Some(v) = non_empty(file.github_api_url) {
            self.github_api_url = v;
        }
        if let Some(v) = file.target_branches.filter(|list| !list.is_empty()) {
            self.target_branches = v;
        }
        if let Some(v) = non_empty(file.default_branch) {
            self.default_branch = v;
        }
        if let Some(v) = non_empty(file.remote) {
            self.remote = v;
        }
        if let Some(v) = file.recent_pr_count {
            self.recent_pr_count = v;
        }
        if let Some(v) = file.http_timeout {
            self.http_timeout = v;
        }

        if let Some(history) = file.history {
            if let Some(enabled) = history.enabled {
                self.history.enabled = enabled;
            }
            if let Some(path) = history.path.filter(|p| !p.as_os_str().is_empty()) {
                self.history.path = Some(path);
            }
        }

        if let Some(ci) = file.ci {
            if let Some(v) = non_empty(ci.default_prefix) {
                self.ci.default_prefix = v;
            }
            if let Some(v) = ci.body_max_len {
                self.ci.body_max_len = v;
            }
            if let Some(identity) = ci.identity {
                if let Some(v) = non_empty(identity.name) {
                    self.ci.identity_name = Some(v);
                }
                if let Some(v) = non_empty(identity.email) {
                    self.ci.identity_email = Some(v);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.forge_kind()?;

        if self.http_timeout.is_zero() {
            bail!("http_timeout must be greater than 0");
        }

        if self.remote.trim().is_empty() {
            bail!("remote cannot be empty");
        }

        if self.ci.body_max_len == 0 {
            bail!("ci.body_max_len must be greater than 0");
        }

        TargetBranchSpec::parse_all(&self.target_branches)?;

        Ok(())
    }

    pub fn forge_kind(&self) -> Result<Option<ForgeKind>> {
        self.forge_type
            .as_deref()
            .map(str::parse::<ForgeKind>)
            .transpose()
    }

    /// Ledger file: the configured path, else the cache-directory default.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history.path.clone().or_else(default_history_path)
    }

    /// Forge default identity with any configured override applied.
    pub fn ci_identity(&self, kind: ForgeKind) -> CommitIdentity {
        let mut identity = CommitIdentity::default_for(kind);
        if let Some(name) = &self.ci.identity_name {
            identity.name = name.clone();
        }
        if let Some(email) = &self.ci.identity_email {
            identity.email = email.clone();
        }
        identity
    }

    /// Generate a commented configuration file.
    pub fn default_toml_template() -> String {
        r#"# Backporter configuration file
# Place this file in your repository root as .backporter.toml

# Forge hosting the repository: "github" or "forgejo"
forge_type = "github"
# Base URL of a Forgejo/Gitea instance (or set FORGEJO_URL)
# forgejo_url = "https://codeberg.org"

# Branches to backport to. Entries containing regex characters are patterns.
target_branches = ["release-1.x", "release-2.x"]

# Branch whose tip the CI pipeline inspects
default_branch = "main"
remote = "origin"
recent_pr_count = 10
http_timeout = "30s"

[history]
enabled = true
# path = "/path/to/history.json"

[ci]
# Prefix used when the PR title carries no conventional-commit type
default_prefix = "fix"
# Longest original description copied into a backport PR
body_max_len = 2000

# [ci.identity]
# name = "release-bot"
# email = "release-bot@example.com"
"#
        .to_string()
    }
}
