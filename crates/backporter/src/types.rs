use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved commit: full hash plus its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub sha: String,
    pub message: String,
}

/// Owner and repository name on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Snapshot of a pull request as reported by the forge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    /// Merge (or squash) commit created when the pull request landed.
    pub merge_commit: String,
    pub head_sha: String,
    pub head_branch: String,
    pub base_branch: String,
    pub merged: bool,
    /// True iff the merge commit has exactly one parent.
    pub squashed: bool,
    pub author: String,
    pub merged_at: Option<DateTime<Utc>>,
    /// Label names, case preserved.
    pub labels: Vec<String>,
}

impl PullRequestInfo {
    pub fn is_squash_merge(&self) -> bool {
        self.squashed
    }

    /// Whether any label mentions "backport", ignoring case.
    pub fn has_backport_label(&self) -> bool {
        self.labels
            .iter()
            .any(|label| label.to_lowercase().contains("backport"))
    }
}

/// Commit metadata as reported by the forge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub email: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub parents: Vec<String>,
}

impl CommitInfo {
    /// A squash merge leaves exactly one parent.
    pub fn is_squash(&self) -> bool {
        self.parents.len() == 1
    }
}

/// Inputs for a single-branch manual backport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackportOptions {
    pub target_branch: String,
    pub dry_run: bool,
}

impl BackportOptions {
    pub fn new(target_branch: impl Into<String>) -> Self {
        Self {
            target_branch: target_branch.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Terminal state of one branch attempt.
#[derive(Debug)]
pub enum OutcomeKind {
    /// The change landed. `commit` is `None` for dry runs.
    Success { commit: Option<String> },
    /// The cherry-pick stopped on conflicts; `output` is what git printed.
    Conflict { output: String },
    /// Nothing to do, e.g. a backport pull request already exists.
    Skipped,
    Failed { error: anyhow::Error },
}

/// Result of one branch attempt.
#[derive(Debug)]
pub struct BackportOutcome {
    pub target_branch: String,
    /// Full hash of the change being replicated, when known.
    pub original_commit: Option<String>,
    /// Pull request attached to this attempt: the source pull request for
    /// manual backports, the backport pull request in automated mode.
    pub pull_request: Option<u64>,
    pub message: String,
    pub kind: OutcomeKind,
}

impl BackportOutcome {
    pub fn success(target: &str, commit: Option<String>, message: impl Into<String>) -> Self {
        Self {
            target_branch: target.to_string(),
            original_commit: None,
            pull_request: None,
            message: message.into(),
            kind: OutcomeKind::Success { commit },
        }
    }

    pub fn conflict(target: &str, output: String) -> Self {
        Self {
            target_branch: target.to_string(),
            original_commit: None,
            pull_request: None,
            message: "cherry-pick stopped on conflicts".to_string(),
            kind: OutcomeKind::Conflict { output },
        }
    }

    pub fn skipped(target: &str, message: impl Into<String>) -> Self {
        Self {
            target_branch: target.to_string(),
            original_commit: None,
            pull_request: None,
            message: message.into(),
            kind: OutcomeKind::Skipped,
        }
    }

    pub fn failed(target: &str, error: anyhow::Error) -> Self {
        Self {
            target_branch: target.to_string(),
            original_commit: None,
            pull_request: None,
            message: format!("{error:#}"),
            kind: OutcomeKind::Failed { error },
        }
    }

    pub fn with_original(mut self, sha: impl Into<String>) -> Self {
        self.original_commit = Some(sha.into());
        self
    }

    pub fn with_pull_request(mut self, number: u64) -> Self {
        self.pull_request = Some(number);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.kind, OutcomeKind::Conflict { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.kind, OutcomeKind::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed { .. })
    }

    /// Commit produced on the target branch, if any.
    pub fn commit(&self) -> Option<&str> {
        match &self.kind {
            OutcomeKind::Success { commit } => commit.as_deref(),
            _ => None,
        }
    }

    pub fn short_state(&self) -> &'static str {
        match self.kind {
            OutcomeKind::Success { .. } => "success",
            OutcomeKind::Conflict { .. } => "conflict",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed { .. } => "failed",
        }
    }
}
