//! Precondition errors.
//!
//! These abort a single operation and are never retried. Anything that goes
//! wrong after the preconditions hold is reported as a failed
//! [`BackportOutcome`](crate::types::BackportOutcome) instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackportError {
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    #[error("repository has uncommitted changes, please commit or stash them first")]
    DirtyWorkingTree,

    #[error("target branch {0} does not exist")]
    TargetBranchMissing(String),

    #[error("PR #{0} was not squash merged - please backport individual commits instead")]
    NotSquashMerged(u64),

    #[error("PR #{0} is not merged")]
    PullRequestNotMerged(u64),

    #[error("forge not configured: {0}")]
    ForgeNotConfigured(String),

    #[error("CI mode requires a CI environment (set CI or GITHUB_ACTIONS)")]
    NotInCi,

    #[error("no target branches configured")]
    NoTargetBranches,

    #[error("{failed} of {total} backports failed")]
    BackportsFailed { failed: usize, total: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type BackportResult<T> = std::result::Result<T, BackportError>;
