//! # Backporter
//!
//! Replicates a merged change onto one or more release branches by
//! cherry-picking it, and in automated mode opens a tracking pull request on
//! each target.
//!
//! ## Pipeline
//!
//! Two entry points share one cherry-pick-and-classify primitive:
//!
//! 1. [`engine::BackportEngine`] backports a commit (or a squash-merged pull
//!    request) onto a single target branch, working directly on that branch
//!    and returning to the caller's branch afterwards.
//! 2. [`ci::CiPipeline`] runs after a merge in an automation job: it finds the
//!    pull request behind the default branch tip, checks for a backport label,
//!    and for every configured target branch cherry-picks onto a disposable
//!    branch, pushes it and opens a pull request.
//!
//! Branch handling differs between the two only through a
//! [`lifecycle::BranchLifecycle`] strategy; cleanup after conflicts or
//! failures is an explicit [`compensation::Compensation`] chain.
//!
//! ## Modules
//!
//! - [`types`]: Domain types: commits, pull requests, outcomes
//! - [`error`]: Precondition error taxonomy
//! - [`git`]: `VersionControl` port and the git CLI adapter
//! - [`forge`]: `Forge` port with GitHub and Forgejo adapters
//! - [`history`]: Append-only ledger of completed backports
//! - [`engine`]: Manual backport-by-commit / backport-by-pull-request
//! - [`ci`]: Automated, label-gated multi-branch pipeline
//! - [`config`]: Configuration file (`.backporter.toml`) loading and merging
//! - [`environment`]: CI detection and commit identity defaults
//! - [`targets`]: Target branch names and patterns

/// Cooperative cancellation checked between branch attempts.
pub mod cancel;

/// Automated, label-gated multi-branch pipeline.
pub mod ci;

/// Ordered best-effort cleanup actions.
pub mod compensation;

/// Configuration file (`.backporter.toml`) loading and merging.
pub mod config;

/// Manual backport-by-commit and backport-by-pull-request.
pub mod engine;

/// CI detection and commit identity defaults.
pub mod environment;

/// Precondition error taxonomy.
pub mod error;

/// `Forge` port with GitHub and Forgejo adapters.
pub mod forge;

/// `VersionControl` port and the git CLI adapter.
pub mod git;

/// Append-only ledger of completed backports.
pub mod history;

/// Branch lifecycle strategies (current branch vs. disposable branch).
pub mod lifecycle;

/// Target branch names and patterns.
pub mod targets;

/// Domain types: commits, pull requests, outcomes.
pub mod types;

/// Version string and the commit signature trailer.
pub mod version;

#[cfg(test)]
mod fakes;
