//! Manual backports: one change onto one target branch.
//!
//! Both entry points here and the CI pipeline go through [`apply_change`],
//! which enters a [`BranchLifecycle`], cherry-picks, classifies the result and
//! signs the new commit.

use anyhow::{Context, Result};

use crate::error::{BackportError, BackportResult};
use crate::forge::Forge;
use crate::git::{PickResult, VersionControl};
use crate::history::{HistoryRecord, HistoryStore};
use crate::lifecycle::{BranchLifecycle, CurrentBranch};
use crate::types::{BackportOptions, BackportOutcome, CommitRef, RepoSlug};
use crate::version::sign_message;

/// Progress sink. The library never prints.
pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
    fn debug(&mut self, _msg: &str) {}
}

/// Result of [`apply_change`].
#[derive(Debug)]
pub(crate) enum Applied {
    /// Picked and signed; `sha` is the new HEAD.
    Committed { sha: String },
    /// Stopped on conflicts. The lifecycle's conflict cleanup has run.
    Conflict { output: String },
    /// Could not enter, pick or sign. The matching cleanup has run.
    Failed(anyhow::Error),
}

/// Enter `lifecycle`, cherry-pick `sha` and append the signature trailer.
pub(crate) fn apply_change(
    vcs: &dyn VersionControl,
    lifecycle: &mut dyn BranchLifecycle,
    sha: &str,
    reporter: &mut dyn Reporter,
) -> Applied {
    if let Err(err) = lifecycle.enter(vcs, reporter) {
        return Applied::Failed(err);
    }

    reporter.debug(&format!(
        "cherry-picking {} onto {}",
        short_sha(sha),
        lifecycle.working_branch()
    ));
    match vcs.cherry_pick(sha) {
        PickResult::Applied => {}
        PickResult::Conflict { output } => {
            lifecycle.on_conflict().run(vcs, reporter);
            return Applied::Conflict { output };
        }
        PickResult::Failed(err) => {
            lifecycle.on_pick_failure().run(vcs, reporter);
            return Applied::Failed(err);
        }
    }

    match sign_head(vcs, sha) {
        Ok(new_sha) => Applied::Committed { sha: new_sha },
        Err(err) => {
            lifecycle.on_commit_failure().run(vcs, reporter);
            Applied::Failed(err)
        }
    }
}

fn sign_head(vcs: &dyn VersionControl, original: &str) -> Result<String> {
    let message = vcs
        .commit_message("HEAD")
        .context("failed to read cherry-picked commit message")?;
    vcs.amend_message(&sign_message(&message, original))?;
    vcs.head_commit().context("failed to read new commit")
}

fn resolve_commit(vcs: &dyn VersionControl, reference: &str) -> BackportResult<CommitRef> {
    let sha = vcs
        .resolve_revision(reference)?
        .ok_or_else(|| BackportError::CommitNotFound(reference.to_string()))?;
    let message = vcs.commit_message(&sha)?;
    Ok(CommitRef { sha, message })
}

pub(crate) fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

/// Lift a forge error back to its typed precondition when it carries one.
pub(crate) fn forge_error(err: anyhow::Error) -> BackportError {
    match err.downcast::<BackportError>() {
        Ok(typed) => typed,
        Err(err) => BackportError::Other(err),
    }
}

/// Backport-by-commit and backport-by-pull-request.
pub struct BackportEngine<'a> {
    vcs: &'a dyn VersionControl,
    forge: Option<(&'a dyn Forge, RepoSlug)>,
    history: Option<&'a mut dyn HistoryStore>,
}

impl<'a> BackportEngine<'a> {
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self {
            vcs,
            forge: None,
            history: None,
        }
    }

    pub fn with_forge(mut self, forge: &'a dyn Forge, slug: RepoSlug) -> Self {
        self.forge = Some((forge, slug));
        self
    }

    /// Record successes in `history`.
    pub fn with_history(mut self, history: &'a mut dyn HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    /// Cherry-pick `reference` onto the target branch, then return to the
    /// branch that was checked out before.
    ///
    /// A conflict leaves the repository on the target branch mid-pick.
    pub fn backport_commit(
        &mut self,
        reference: &str,
        options: &BackportOptions,
        reporter: &mut dyn Reporter,
    ) -> BackportResult<BackportOutcome> {
        let vcs = self.vcs;
        let target = options.target_branch.as_str();

        let CommitRef { sha, message } = resolve_commit(vcs, reference)?;

        match vcs.has_uncommitted_changes() {
            Ok(true) => return Err(BackportError::DirtyWorkingTree),
            Ok(false) => {}
            Err(err) => reporter.warn(&format!("could not check working tree status: {err:#}")),
        }

        if !vcs.branch_exists(target)? {
            return Err(BackportError::TargetBranchMissing(target.to_string()));
        }

        let original_branch = vcs.current_branch()?;

        if options.dry_run {
            reporter.info(&format!(
                "[dry-run] would cherry-pick {} onto {target}",
                short_sha(&sha)
            ));
            return Ok(BackportOutcome::success(
                target,
                None,
                format!("dry run: {} would be backported to {target}", short_sha(&sha)),
            )
            .with_original(sha));
        }

        reporter.info(&format!("backporting {} to {target}", short_sha(&sha)));
        let mut lifecycle = CurrentBranch::new(target, original_branch);
        let outcome = match apply_change(vcs, &mut lifecycle, &sha, reporter) {
            Applied::Committed { sha: new_sha } => {
                if let Some(history) = self.history.as_deref_mut() {
                    let record = HistoryRecord::new(&sha, &new_sha, target, &message);
                    if let Err(err) = history.append(record) {
                        reporter.warn(&format!("failed to record backport history: {err:#}"));
                    }
                }
                lifecycle.finish().run(vcs, reporter);
                BackportOutcome::success(
                    target,
                    Some(new_sha.clone()),
                    format!(
                        "backported {} to {target} as {}",
                        short_sha(&sha),
                        short_sha(&new_sha)
                    ),
                )
            }
            Applied::Conflict { output } => {
                reporter.warn(&format!(
                    "cherry-pick of {} onto {target} stopped on conflicts",
                    short_sha(&sha)
                ));
                BackportOutcome::conflict(target, output)
            }
            Applied::Failed(err) => {
                reporter.error(&format!("backport to {target} failed: {err:#}"));
                BackportOutcome::failed(target, err)
            }
        };

        Ok(outcome.with_original(sha))
    }

    /// Backport the squash commit of a merged pull request.
    ///
    /// Non-squash merges are rejected before anything in the repository is
    /// touched.
    pub fn backport_pull_request(
        &mut self,
        number: u64,
        options: &BackportOptions,
        reporter: &mut dyn Reporter,
    ) -> BackportResult<BackportOutcome> {
        let (forge, slug) = self.forge.as_ref().ok_or_else(|| {
            BackportError::ForgeNotConfigured(
                "set forge_type to backport pull requests".to_string(),
            )
        })?;

        reporter.info(&format!("fetching PR #{number} from {}", forge.name()));
        let pr = forge.get_pull_request(slug, number).map_err(forge_error)?;
        if !pr.is_squash_merge() {
            return Err(BackportError::NotSquashMerged(number));
        }

        let outcome = self.backport_commit(&pr.merge_commit, options, reporter)?;

        if outcome.commit().is_some()
            && let Some(history) = self.history.as_deref_mut()
            && let Err(err) =
                history.attach_pull_request(&pr.merge_commit, &options.target_branch, number)
        {
            reporter.warn(&format!("failed to record PR #{number} in history: {err:#}"));
        }

        Ok(outcome.with_pull_request(number))
    }
}
