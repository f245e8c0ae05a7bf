//! Where a change is applied and how to back out of it.
//!
//! Manual backports apply directly on the target branch and return to the
//! caller's branch afterwards ([`CurrentBranch`]). The CI pipeline applies on a
//! throwaway branch cut from the remote target ([`DisposableBranch`]).

use anyhow::Result;

use crate::compensation::{CompensatingAction, Compensation};
use crate::engine::Reporter;
use crate::git::VersionControl;

pub trait BranchLifecycle {
    /// Branch the cherry-pick lands on.
    fn working_branch(&self) -> &str;

    /// Switch to the working branch. On error the repository is back where
    /// it started.
    fn enter(&mut self, vcs: &dyn VersionControl, reporter: &mut dyn Reporter) -> Result<()>;

    /// Cleanup after the cherry-pick stopped on conflicts.
    fn on_conflict(&self) -> Compensation;

    /// Cleanup after the cherry-pick failed outright.
    fn on_pick_failure(&self) -> Compensation;

    /// Cleanup after a committed change could not be signed or published.
    fn on_commit_failure(&self) -> Compensation;

    /// Best-effort return once the attempt is done.
    fn finish(&self) -> Compensation;
}

/// Apply on the target branch itself and go back to `original` afterwards.
#[derive(Debug, Clone)]
pub struct CurrentBranch {
    target: String,
    original: Option<String>,
}

impl CurrentBranch {
    pub fn new(target: impl Into<String>, original: Option<String>) -> Self {
        Self {
            target: target.into(),
            original,
        }
    }

    fn back_to_original(&self) -> Compensation {
        match &self.original {
            Some(branch) if *branch != self.target => {
                Compensation::new().then(CompensatingAction::Checkout(branch.clone()))
            }
            _ => Compensation::new(),
        }
    }
}

impl BranchLifecycle for CurrentBranch {
    fn working_branch(&self) -> &str {
        &self.target
    }

    fn enter(&mut self, vcs: &dyn VersionControl, _reporter: &mut dyn Reporter) -> Result<()> {
        vcs.checkout(&self.target)
    }

    /// The conflict is left in place for the user to resolve.
    fn on_conflict(&self) -> Compensation {
        Compensation::new()
    }

    fn on_pick_failure(&self) -> Compensation {
        let mut chain = Compensation::new().then(CompensatingAction::AbortCherryPick);
        for action in self.back_to_original().actions() {
            chain = chain.then(action.clone());
        }
        chain
    }

    fn on_commit_failure(&self) -> Compensation {
        self.back_to_original()
    }

    fn finish(&self) -> Compensation {
        self.back_to_original()
    }
}

/// Apply on `backport-{pr}-to-{target}`, cut from `{remote}/{target}`.
#[derive(Debug, Clone)]
pub struct DisposableBranch {
    name: String,
    target: String,
    remote: String,
}

impl DisposableBranch {
    pub fn new(pr_number: u64, target: impl Into<String>, remote: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            name: branch_name(pr_number, &target),
            target,
            remote: remote.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn discard(&self) -> Compensation {
        Compensation::new()
            .then(CompensatingAction::Checkout(self.target.clone()))
            .then(CompensatingAction::DeleteBranch(self.name.clone()))
    }
}

/// Deterministic name of the branch a pipeline run pushes.
pub fn branch_name(pr_number: u64, target: &str) -> String {
    format!("backport-{pr_number}-to-{target}")
}

impl BranchLifecycle for DisposableBranch {
    fn working_branch(&self) -> &str {
        &self.name
    }

    /// Recreates the branch when an earlier run left a local copy behind.
    fn enter(&mut self, vcs: &dyn VersionControl, reporter: &mut dyn Reporter) -> Result<()> {
        if vcs.branch_exists(&self.name)? {
            reporter.info(&format!("replacing stale local branch {}", self.name));
            vcs.delete_branch(&self.name)?;
        }

        let base = format!("{}/{}", self.remote, self.target);
        vcs.create_branch(&self.name, &base)?;

        if let Err(err) = vcs.checkout(&self.name) {
            Compensation::new()
                .then(CompensatingAction::DeleteBranch(self.name.clone()))
                .run(vcs, reporter);
            return Err(err);
        }
        Ok(())
    }

    fn on_conflict(&self) -> Compensation {
        self.on_pick_failure()
    }

    fn on_pick_failure(&self) -> Compensation {
        let mut chain = Compensation::new().then(CompensatingAction::AbortCherryPick);
        for action in self.discard().actions() {
            chain = chain.then(action.clone());
        }
        chain
    }

    fn on_commit_failure(&self) -> Compensation {
        self.discard()
    }

    fn finish(&self) -> Compensation {
        Compensation::new().then(CompensatingAction::Checkout(self.target.clone()))
    }
}
