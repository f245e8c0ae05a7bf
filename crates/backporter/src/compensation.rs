//! Best-effort cleanup after a branch attempt stops early.
//!
//! A [`Compensation`] is an ordered list of actions. Every action runs even if
//! an earlier one failed; failures are reported as warnings and collected.

use std::fmt;

use anyhow::Result;

use crate::engine::Reporter;
use crate::git::VersionControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensatingAction {
    AbortCherryPick,
    Checkout(String),
    DeleteBranch(String),
}

impl CompensatingAction {
    fn apply(&self, vcs: &dyn VersionControl) -> Result<()> {
        match self {
            CompensatingAction::AbortCherryPick => vcs.abort_cherry_pick(),
            CompensatingAction::Checkout(branch) => vcs.checkout(branch),
            CompensatingAction::DeleteBranch(branch) => vcs.delete_branch(branch),
        }
    }
}

impl fmt::Display for CompensatingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompensatingAction::AbortCherryPick => f.write_str("abort cherry-pick"),
            CompensatingAction::Checkout(branch) => write!(f, "checkout {branch}"),
            CompensatingAction::DeleteBranch(branch) => write!(f, "delete branch {branch}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compensation {
    actions: Vec<CompensatingAction>,
}

impl Compensation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, action: CompensatingAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(&self) -> &[CompensatingAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn run(&self, vcs: &dyn VersionControl, reporter: &mut dyn Reporter) -> CompensationReport {
        let mut report = CompensationReport::default();
        for action in &self.actions {
            reporter.debug(&format!("cleanup: {action}"));
            if let Err(err) = action.apply(vcs) {
                reporter.warn(&format!("cleanup step '{action}' failed: {err:#}"));
                report.failures.push((action.clone(), err));
            }
        }
        report
    }
}

/// Cleanup steps that failed, in execution order.
#[derive(Debug, Default)]
pub struct CompensationReport {
    pub failures: Vec<(CompensatingAction, anyhow::Error)>,
}

impl CompensationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
