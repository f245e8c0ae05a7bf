//! Automated post-merge backports.
//!
//! After a merge to the default branch, [`CiPipeline`] reads the tip commit,
//! finds the pull request it came from and, when that pull request carries a
//! backport label, opens one backport pull request per target branch.
//!
//! Per-branch failures never stop the fan-out. Finding no pull request or no
//! label is a successful no-op.

use std::fmt::Write as _;
use std::sync::LazyLock;

use anyhow::{Context, anyhow};
use regex::Regex;

use crate::cancel::CancelToken;
use crate::config::BackporterConfig;
use crate::engine::{Applied, Reporter, apply_change, forge_error, short_sha};
use crate::environment::{CiProvider, CommitIdentity};
use crate::error::{BackportError, BackportResult};
use crate::forge::{Forge, NewPullRequest};
use crate::git::VersionControl;
use crate::history::{HistoryRecord, HistoryStore};
use crate::lifecycle::{BranchLifecycle, DisposableBranch, branch_name};
use crate::targets::{ResolvedTarget, TargetBranchSpec, resolve_targets};
use crate::types::{BackportOutcome, PullRequestInfo, RepoSlug};
use crate::version::{REPOSITORY_URL, VERSION};

/// Tried in order; the first that yields a positive number wins.
static PR_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\(#(\d+)\)",
        r"Merge pull request #(\d+)",
        r"Merge branch.*#(\d+)",
        r"See merge request.*!(\d+)",
        r"Reviewed-on:.*/pulls?/(\d+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static CONVENTIONAL_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^((?:feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(?:\([^)]+\))?):\s",
    )
    .ok()
});

const TRUNCATION_MARKER: &str = "\n\n... (truncated)";
const SUMMARY_RULE_WIDTH: usize = 40;

/// Pull request number referenced by a merge commit message.
pub fn extract_pr_number(message: &str) -> Option<u64> {
    PR_NUMBER_PATTERNS.iter().find_map(|re| {
        re.captures(message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .filter(|n| *n > 0)
    })
}

/// `type` or `type(scope)` from a conventional-commit title.
pub fn extract_conventional_prefix(title: &str) -> Option<String> {
    CONVENTIONAL_PREFIX
        .as_ref()?
        .captures(title)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Description of a backport pull request.
pub fn format_backport_body(pr: &PullRequestInfo, target: &str, max_len: usize) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Backport of #{} to `{target}`.", pr.number);
    let _ = writeln!(body);
    let _ = writeln!(body, "- **Original PR**: #{} {}", pr.number, pr.title);
    if !pr.author.is_empty() {
        let _ = writeln!(body, "- **Author**: @{}", pr.author);
    }
    match pr.merged_at {
        Some(at) => {
            let _ = writeln!(body, "- **Merged**: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => {
            let _ = writeln!(body, "- **Merged**: unknown");
        }
    }

    if !pr.body.trim().is_empty() {
        let _ = writeln!(body);
        let _ = writeln!(body, "### Original description");
        let _ = writeln!(body);
        body.push_str(&truncate_description(&pr.body, max_len));
        body.push('\n');
    }

    let _ = writeln!(body);
    let _ = writeln!(body, "---");
    let _ = writeln!(
        body,
        "Opened automatically by backporter {VERSION} ({REPOSITORY_URL})."
    );
    body
}

/// At most `max_len` characters of `text`, plus a marker when cut.
pub fn truncate_description(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Pipeline knobs, usually taken from [`BackporterConfig`].
#[derive(Debug, Clone)]
pub struct CiSettings {
    pub remote: String,
    pub default_branch: String,
    pub target_branches: Vec<String>,
    pub default_prefix: String,
    pub body_max_len: usize,
    pub dry_run: bool,
}

impl CiSettings {
    pub fn from_config(config: &BackporterConfig, dry_run: bool) -> Self {
        Self {
            remote: config.remote.clone(),
            default_branch: config.default_branch.clone(),
            target_branches: config.target_branches.clone(),
            default_prefix: config.ci.default_prefix.clone(),
            body_max_len: config.ci.body_max_len,
            dry_run,
        }
    }
}

/// Execution context established once per run by [`prepare`].
#[derive(Debug, Clone)]
pub struct CiContext {
    pub provider: CiProvider,
    pub identity: CommitIdentity,
    /// Whether the identity had to be written into the repository config.
    pub identity_configured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiStatus {
    /// The tip commit references no pull request.
    NoPullRequest,
    /// The pull request has no backport label.
    NotLabelled,
    /// Target branches were attempted.
    Completed,
}

#[derive(Debug)]
pub struct CiReport {
    pub status: CiStatus,
    pub pull_request: Option<u64>,
    pub outcomes: Vec<BackportOutcome>,
    /// Stopped early by an interrupt.
    pub cancelled: bool,
}

impl CiReport {
    fn no_op(status: CiStatus, pull_request: Option<u64>) -> Self {
        Self {
            status,
            pull_request,
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.is_failed() || o.is_conflict())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Per-branch status lines and the aggregate counts.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match self.pull_request {
            Some(n) => lines.push(format!("Backport summary for PR #{n}")),
            None => lines.push("Backport summary".to_string()),
        }
        lines.push("=".repeat(SUMMARY_RULE_WIDTH));

        for outcome in &self.outcomes {
            let mut line = format!("{:<8} {}", outcome.short_state(), outcome.target_branch);
            if let Some(pr) = outcome.pull_request {
                let _ = write!(line, " -> PR #{pr}");
            }
            if outcome.is_failed() || outcome.is_conflict() {
                let _ = write!(line, ": {}", outcome.message);
            }
            lines.push(line);
        }

        lines.push("-".repeat(SUMMARY_RULE_WIDTH));
        lines.push(format!(
            "{} succeeded, {} failed, {} skipped",
            self.succeeded(),
            self.failed(),
            self.skipped()
        ));
        if self.cancelled {
            lines.push("interrupted before all branches were attempted".to_string());
        }
        lines
    }

    /// `Err` when any branch failed.
    pub fn into_result(self) -> BackportResult<Self> {
        let failed = self.failed();
        if failed > 0 {
            return Err(BackportError::BackportsFailed {
                failed,
                total: self.outcomes.len(),
            });
        }
        Ok(self)
    }
}

/// Require a CI environment and make sure commits have an author.
///
/// An identity already configured in the repository is kept.
pub fn prepare(
    vcs: &dyn VersionControl,
    provider: Option<CiProvider>,
    identity: CommitIdentity,
    reporter: &mut dyn Reporter,
) -> BackportResult<CiContext> {
    let provider = provider.ok_or(BackportError::NotInCi)?;
    reporter.info(&format!("running in {provider}"));

    let identity_configured = vcs.ensure_identity(&identity)?;
    if identity_configured {
        reporter.info(&format!(
            "configured commit identity {} <{}>",
            identity.name, identity.email
        ));
    } else {
        reporter.debug("keeping existing commit identity");
    }

    Ok(CiContext {
        provider,
        identity,
        identity_configured,
    })
}

/// Label-gated multi-branch backport run.
pub struct CiPipeline<'a> {
    vcs: &'a dyn VersionControl,
    forge: &'a dyn Forge,
    slug: RepoSlug,
    settings: CiSettings,
    history: Option<&'a mut dyn HistoryStore>,
    cancel: CancelToken,
}

impl<'a> CiPipeline<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        forge: &'a dyn Forge,
        slug: RepoSlug,
        settings: CiSettings,
    ) -> Self {
        Self {
            vcs,
            forge,
            slug,
            settings,
            history: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_history(mut self, history: &'a mut dyn HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(
        &mut self,
        ctx: &CiContext,
        reporter: &mut dyn Reporter,
    ) -> BackportResult<CiReport> {
        let settings = self.settings.clone();
        reporter.debug(&format!("pipeline context: {ctx:?}"));

        reporter.info(&format!("fetching {}", settings.remote));
        self.vcs.fetch(&settings.remote)?;

        let tip = format!("{}/{}", settings.remote, settings.default_branch);
        let message = self.vcs.commit_message(&tip)?;

        let Some(number) = extract_pr_number(&message) else {
            reporter.info(&format!(
                "latest commit on {tip} references no pull request; nothing to backport"
            ));
            return Ok(CiReport::no_op(CiStatus::NoPullRequest, None));
        };
        reporter.info(&format!("latest commit on {tip} is from PR #{number}"));

        let pr = self
            .forge
            .get_pull_request(&self.slug, number)
            .map_err(forge_error)?;
        if !pr.has_backport_label() {
            reporter.info(&format!("PR #{number} has no backport label; nothing to do"));
            return Ok(CiReport::no_op(CiStatus::NotLabelled, Some(number)));
        }
        if !pr.is_squash_merge() {
            reporter.warn(&format!(
                "PR #{number} was not squash merged; cherry-picks may fail"
            ));
        }

        let prefix = extract_conventional_prefix(&pr.title)
            .unwrap_or_else(|| settings.default_prefix.clone());
        let original_message = self
            .vcs
            .commit_message(&pr.merge_commit)
            .with_context(|| format!("failed to read merge commit of PR #{number}"))?;

        if settings.target_branches.is_empty() {
            return Err(BackportError::NoTargetBranches);
        }
        let specs = TargetBranchSpec::parse_all(&settings.target_branches)?;
        let remote_branches = self.vcs.list_remote_branches(&settings.remote)?;
        let resolved = resolve_targets(&specs, &remote_branches);
        if resolved.branches.is_empty() && resolved.missing.is_empty() {
            reporter.warn("no remote branch matches the configured target branches");
        }

        let mut report = CiReport::no_op(CiStatus::Completed, Some(number));
        for entry in &resolved.in_order {
            if self.cancel.is_cancelled() {
                reporter.warn("interrupted; skipping remaining target branches");
                report.cancelled = true;
                break;
            }
            let outcome = match entry {
                ResolvedTarget::Missing(name) => BackportOutcome::failed(
                    name,
                    anyhow!("target branch {name} does not exist on {}", settings.remote),
                )
                .with_original(&pr.merge_commit),
                ResolvedTarget::Existing(target) => {
                    self.backport_to(&pr, &prefix, &original_message, target, reporter)
                }
            };
            if outcome.is_failed() {
                reporter.error(&format!("{}: {}", outcome.target_branch, outcome.message));
            } else {
                reporter.info(&format!("{}: {}", outcome.target_branch, outcome.message));
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    fn backport_to(
        &mut self,
        pr: &PullRequestInfo,
        prefix: &str,
        original_message: &str,
        target: &str,
        reporter: &mut dyn Reporter,
    ) -> BackportOutcome {
        let vcs = self.vcs;
        let branch = branch_name(pr.number, target);

        match self
            .forge
            .list_open_pull_requests(&self.slug, Some(branch.as_str()))
        {
            Ok(open) => {
                if let Some(existing) = open.first() {
                    return BackportOutcome::skipped(
                        target,
                        format!("backport PR #{} already open", existing.number),
                    )
                    .with_pull_request(existing.number)
                    .with_original(&pr.merge_commit);
                }
            }
            Err(err) => reporter.warn(&format!(
                "could not check for an existing backport PR on {branch}: {err:#}"
            )),
        }

        if self.settings.dry_run {
            return BackportOutcome::success(
                target,
                None,
                format!(
                    "dry run: would cherry-pick {} onto {branch} and open a PR against {target}",
                    short_sha(&pr.merge_commit)
                ),
            )
            .with_original(&pr.merge_commit);
        }

        let mut lifecycle = DisposableBranch::new(pr.number, target, &self.settings.remote);
        let new_sha = match apply_change(vcs, &mut lifecycle, &pr.merge_commit, reporter) {
            Applied::Committed { sha } => sha,
            Applied::Conflict { output } => {
                let output = output.trim_end();
                reporter.warn(&format!(
                    "cherry-pick of {} onto {branch} stopped on conflicts:\n{output}",
                    short_sha(&pr.merge_commit)
                ));
                let summary = "cherry-pick has conflicts - manual backport required";
                return BackportOutcome::failed(target, anyhow!("{output}").context(summary))
                    .with_message(summary)
                    .with_original(&pr.merge_commit);
            }
            Applied::Failed(err) => {
                return BackportOutcome::failed(target, err).with_original(&pr.merge_commit);
            }
        };

        if let Err(err) = vcs.push(&self.settings.remote, lifecycle.working_branch()) {
            lifecycle.on_commit_failure().run(vcs, reporter);
            return BackportOutcome::failed(target, err).with_original(&pr.merge_commit);
        }

        let request = NewPullRequest {
            title: format!("{prefix}: backport #{} to {target}", pr.number),
            body: format_backport_body(pr, target, self.settings.body_max_len),
            head: lifecycle.working_branch().to_string(),
            base: target.to_string(),
        };
        let created = self.forge.create_pull_request(&self.slug, &request);
        // the pushed branch stays on the remote either way
        lifecycle.finish().run(vcs, reporter);

        let number = match created {
            Ok(number) => number,
            Err(err) => {
                return BackportOutcome::failed(
                    target,
                    err.context(format!("failed to create PR for {branch}")),
                )
                .with_original(&pr.merge_commit);
            }
        };

        if let Some(history) = self.history.as_deref_mut() {
            let mut record =
                HistoryRecord::new(&pr.merge_commit, &new_sha, target, original_message);
            record.pr_number = Some(number);
            if let Err(err) = history.append(record) {
                reporter.warn(&format!("failed to record backport history: {err:#}"));
            }
        }

        BackportOutcome::success(
            target,
            Some(new_sha),
            format!("created backport PR #{number}"),
        )
        .with_pull_request(number)
        .with_original(&pr.merge_commit)
    }
}
