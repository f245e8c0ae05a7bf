//! In-memory stand-ins for the repository and the forge.
//!
//! `FakeVcs` logs every mutating call in git argv form so tests can assert on
//! the exact sequence.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::{Result, anyhow, bail};
use chrono::{TimeZone, Utc};

use crate::engine::Reporter;
use crate::environment::CommitIdentity;
use crate::error::BackportError;
use crate::forge::{Forge, NewPullRequest};
use crate::git::{PickResult, VersionControl};
use crate::history::{HistoryRecord, HistoryStore};
use crate::types::{CommitInfo, PullRequestInfo, RepoSlug};

#[derive(Debug, Default)]
pub(crate) struct CollectingReporter {
    pub infos: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
    pub debugs: Vec<String>,
}

impl Reporter for CollectingReporter {
    fn info(&mut self, msg: &str) {
        self.infos.push(msg.to_string());
    }

    fn warn(&mut self, msg: &str) {
        self.warns.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn debug(&mut self, msg: &str) {
        self.debugs.push(msg.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakePick {
    Conflict,
    Fail,
}

#[derive(Debug, Default)]
struct State {
    current: Option<String>,
    branches: BTreeSet<String>,
    /// Local branch -> the branch it was cut from, remote prefix stripped.
    bases: HashMap<String, String>,
    remotes: BTreeMap<String, BTreeSet<String>>,
    commits: HashMap<String, String>,
    refs: HashMap<String, String>,
    head: Option<String>,
    dirty: bool,
    picks: HashMap<String, FakePick>,
    fail_checkout: HashSet<String>,
    fail_push: HashSet<String>,
    pushed: Vec<(String, String)>,
    identity: Option<CommitIdentity>,
    counter: u32,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeVcs {
    state: RefCell<State>,
}

impl FakeVcs {
    pub fn new(current: &str) -> Self {
        let vcs = Self::default();
        {
            let mut s = vcs.state.borrow_mut();
            s.current = Some(current.to_string());
            s.branches.insert(current.to_string());
        }
        vcs
    }

    pub fn with_branches(self, names: &[&str]) -> Self {
        {
            let mut s = self.state.borrow_mut();
            s.branches = names.iter().map(|n| n.to_string()).collect();
        }
        self
    }

    pub fn with_remote_branches(self, remote: &str, names: &[&str]) -> Self {
        self.state.borrow_mut().remotes.insert(
            remote.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    pub fn with_commit(self, sha: &str, message: &str) -> Self {
        self.state
            .borrow_mut()
            .commits
            .insert(sha.to_string(), message.to_string());
        self
    }

    /// Point a symbolic name such as `origin/main` at a commit.
    pub fn with_ref(self, name: &str, sha: &str) -> Self {
        self.state
            .borrow_mut()
            .refs
            .insert(name.to_string(), sha.to_string());
        self
    }

    pub fn with_identity(self, identity: CommitIdentity) -> Self {
        self.state.borrow_mut().identity = Some(identity);
        self
    }

    pub fn dirty(self) -> Self {
        self.state.borrow_mut().dirty = true;
        self
    }

    /// Script the cherry-pick outcome for a branch, or for any branch cut
    /// from it.
    pub fn pick(self, branch: &str, pick: FakePick) -> Self {
        self.state
            .borrow_mut()
            .picks
            .insert(branch.to_string(), pick);
        self
    }

    pub fn fail_checkout(self, branch: &str) -> Self {
        self.state
            .borrow_mut()
            .fail_checkout
            .insert(branch.to_string());
        self
    }

    pub fn fail_push(self, branch: &str) -> Self {
        self.state.borrow_mut().fail_push.insert(branch.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn current(&self) -> Option<String> {
        self.state.borrow().current.clone()
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.state.borrow().branches.contains(name)
    }

    pub fn message_of(&self, sha: &str) -> Option<String> {
        self.state.borrow().commits.get(sha).cloned()
    }

    pub fn pushed(&self) -> Vec<(String, String)> {
        self.state.borrow().pushed.clone()
    }

    pub fn identity(&self) -> Option<CommitIdentity> {
        self.state.borrow().identity.clone()
    }

    fn log(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl State {
    fn resolve(&self, rev: &str) -> Option<String> {
        if rev == "HEAD" {
            return self.head.clone();
        }
        if let Some(sha) = self.refs.get(rev) {
            return Some(sha.clone());
        }
        if rev.len() >= 4 {
            return self
                .commits
                .keys()
                .find(|sha| sha.starts_with(rev))
                .cloned();
        }
        None
    }

    fn remote_has(&self, reference: &str) -> Option<String> {
        let (remote, branch) = reference.split_once('/')?;
        self.remotes
            .get(remote)
            .filter(|set| set.contains(branch))
            .map(|_| branch.to_string())
    }

    fn next_sha(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{:0>width$}", self.counter, width = 40 - prefix.len())
    }
}

impl VersionControl for FakeVcs {
    fn resolve_revision(&self, rev: &str) -> Result<Option<String>> {
        Ok(self.state.borrow().resolve(rev))
    }

    fn commit_message(&self, rev: &str) -> Result<String> {
        let s = self.state.borrow();
        s.resolve(rev)
            .and_then(|sha| s.commits.get(&sha).cloned())
            .ok_or_else(|| anyhow!("unknown revision {rev}"))
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.has_branch(name))
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        Ok(self.state.borrow().branches.iter().cloned().collect())
    }

    fn list_remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .borrow()
            .remotes
            .get(remote)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.current())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self.state.borrow().dirty)
    }

    fn checkout(&self, name: &str) -> Result<()> {
        self.log(format!("checkout {name}"));
        let mut s = self.state.borrow_mut();
        if s.fail_checkout.contains(name) {
            bail!("error: pathspec '{name}' did not match");
        }
        if !s.branches.contains(name) {
            let tracked = s
                .remotes
                .values()
                .any(|set| set.contains(name));
            if !tracked {
                bail!("error: pathspec '{name}' did not match any file(s) known to git");
            }
            s.branches.insert(name.to_string());
        }
        s.current = Some(name.to_string());
        Ok(())
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.log(format!("branch {name} {from}"));
        let mut s = self.state.borrow_mut();
        if s.branches.contains(name) {
            bail!("fatal: a branch named '{name}' already exists");
        }
        let base = if s.branches.contains(from) {
            from.to_string()
        } else if let Some(branch) = s.remote_has(from) {
            branch
        } else {
            bail!("fatal: not a valid object name: '{from}'");
        };
        s.branches.insert(name.to_string());
        s.bases.insert(name.to_string(), base);
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.log(format!("branch -D {name}"));
        let mut s = self.state.borrow_mut();
        if s.current.as_deref() == Some(name) {
            bail!("error: cannot delete branch '{name}' checked out");
        }
        if !s.branches.remove(name) {
            bail!("error: branch '{name}' not found");
        }
        Ok(())
    }

    fn cherry_pick(&self, sha: &str) -> PickResult {
        self.log(format!("cherry-pick {sha}"));
        let mut s = self.state.borrow_mut();
        let current = s.current.clone().unwrap_or_default();
        let scripted = s
            .picks
            .get(&current)
            .or_else(|| s.bases.get(&current).and_then(|base| s.picks.get(base)))
            .copied();

        match scripted {
            Some(FakePick::Conflict) => PickResult::Conflict {
                output: format!(
                    "CONFLICT (content): Merge conflict in src/lib.rs\nerror: could not apply {sha}"
                ),
            },
            Some(FakePick::Fail) => {
                PickResult::Failed(anyhow!("git cherry-pick failed: fatal: bad object {sha}"))
            }
            None => {
                let Some(message) = s.commits.get(sha).cloned() else {
                    return PickResult::Failed(anyhow!("fatal: bad revision '{sha}'"));
                };
                let new_sha = s.next_sha("c0ffee");
                s.commits.insert(new_sha.clone(), message);
                s.head = Some(new_sha);
                PickResult::Applied
            }
        }
    }

    fn abort_cherry_pick(&self) -> Result<()> {
        self.log("cherry-pick --abort".to_string());
        Ok(())
    }

    fn continue_cherry_pick(&self) -> Result<()> {
        self.log("cherry-pick --continue".to_string());
        Ok(())
    }

    fn amend_message(&self, message: &str) -> Result<()> {
        self.log("commit --amend".to_string());
        let mut s = self.state.borrow_mut();
        if s.head.is_none() {
            bail!("fatal: nothing to amend");
        }
        let new_sha = s.next_sha("a11ce");
        s.commits.insert(new_sha.clone(), message.to_string());
        s.head = Some(new_sha);
        Ok(())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.log(format!("push {remote} {branch}"));
        let mut s = self.state.borrow_mut();
        if s.fail_push.contains(branch) {
            bail!("! [remote rejected] {branch} (pre-receive hook declined)");
        }
        s.pushed.push((remote.to_string(), branch.to_string()));
        Ok(())
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        self.log(format!("fetch {remote}"));
        Ok(())
    }

    fn head_commit(&self) -> Result<String> {
        self.state
            .borrow()
            .head
            .clone()
            .ok_or_else(|| anyhow!("no HEAD"))
    }

    fn remote_url(&self, _remote: &str) -> Result<String> {
        Ok("git@example.com:acme/widgets.git".to_string())
    }

    fn ensure_identity(&self, identity: &CommitIdentity) -> Result<bool> {
        let mut s = self.state.borrow_mut();
        if s.identity.is_some() {
            return Ok(false);
        }
        s.identity = Some(identity.clone());
        s.calls.push(format!("config user.name {}", identity.name));
        Ok(true)
    }
}

/// A merged pull request whose merge commit is `merge_commit`.
pub(crate) fn merged_pr(
    number: u64,
    merge_commit: &str,
    squashed: bool,
    labels: &[&str],
) -> PullRequestInfo {
    PullRequestInfo {
        number,
        title: "fix(core): null deref".to_string(),
        body: "Fixes a crash on startup.".to_string(),
        state: "closed".to_string(),
        merge_commit: merge_commit.to_string(),
        head_sha: "feedface".to_string(),
        head_branch: format!("topic-{number}"),
        base_branch: "main".to_string(),
        merged: true,
        squashed,
        author: "dev".to_string(),
        merged_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).single(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}

#[derive(Default)]
pub(crate) struct FakeForge {
    prs: HashMap<u64, PullRequestInfo>,
    unmerged: HashSet<u64>,
    open: RefCell<Vec<PullRequestInfo>>,
    created: RefCell<Vec<NewPullRequest>>,
    next_number: Cell<u64>,
    /// Remaining `create_pull_request` calls that fail.
    fail_create: Cell<u32>,
    fail_list_open: bool,
}

impl FakeForge {
    pub fn new() -> Self {
        Self {
            next_number: Cell::new(100),
            ..Self::default()
        }
    }

    pub fn with_pr(mut self, pr: PullRequestInfo) -> Self {
        self.prs.insert(pr.number, pr);
        self
    }

    pub fn with_unmerged(mut self, number: u64) -> Self {
        self.unmerged.insert(number);
        self
    }

    pub fn with_open(self, head: &str, number: u64) -> Self {
        self.open.borrow_mut().push(PullRequestInfo {
            number,
            state: "open".to_string(),
            head_branch: head.to_string(),
            ..PullRequestInfo::default()
        });
        self
    }

    pub fn failing_create(self) -> Self {
        self.fail_create.set(u32::MAX);
        self
    }

    pub fn failing_create_once(self) -> Self {
        self.fail_create.set(1);
        self
    }

    pub fn failing_list_open(mut self) -> Self {
        self.fail_list_open = true;
        self
    }

    pub fn created(&self) -> Vec<NewPullRequest> {
        self.created.borrow().clone()
    }
}

impl Forge for FakeForge {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn get_pull_request(&self, _slug: &RepoSlug, number: u64) -> Result<PullRequestInfo> {
        if self.unmerged.contains(&number) {
            return Err(BackportError::PullRequestNotMerged(number).into());
        }
        self.prs
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow!("fetching PR #{number} failed (404 Not Found)"))
    }

    fn get_commit(&self, _slug: &RepoSlug, sha: &str) -> Result<CommitInfo> {
        Ok(CommitInfo {
            sha: sha.to_string(),
            parents: vec!["parent".to_string()],
            ..CommitInfo::default()
        })
    }

    fn list_recent_pull_requests(
        &self,
        _slug: &RepoSlug,
        limit: usize,
    ) -> Result<Vec<PullRequestInfo>> {
        let mut prs: Vec<PullRequestInfo> = self.prs.values().cloned().collect();
        prs.sort_by(|a, b| b.number.cmp(&a.number));
        prs.truncate(limit);
        Ok(prs)
    }

    fn list_open_pull_requests(
        &self,
        _slug: &RepoSlug,
        head: Option<&str>,
    ) -> Result<Vec<PullRequestInfo>> {
        if self.fail_list_open {
            bail!("listing open pull requests failed (502 Bad Gateway)");
        }
        Ok(self
            .open
            .borrow()
            .iter()
            .filter(|pr| head.is_none_or(|h| pr.head_branch == h))
            .cloned()
            .collect())
    }

    fn create_pull_request(&self, _slug: &RepoSlug, request: &NewPullRequest) -> Result<u64> {
        let failures = self.fail_create.get();
        if failures > 0 {
            if failures != u32::MAX {
                self.fail_create.set(failures - 1);
            }
            bail!("creating pull request failed (502): Bad Gateway");
        }
        let number = self.next_number.get();
        self.next_number.set(number + 1);
        self.created.borrow_mut().push(request.clone());
        self.open.borrow_mut().push(PullRequestInfo {
            number,
            title: request.title.clone(),
            state: "open".to_string(),
            head_branch: request.head.clone(),
            base_branch: request.base.clone(),
            ..PullRequestInfo::default()
        });
        Ok(number)
    }
}

/// A ledger whose every write fails.
pub(crate) struct BrokenHistory;

impl HistoryStore for BrokenHistory {
    fn append(&mut self, _record: HistoryRecord) -> Result<()> {
        bail!("disk full")
    }

    fn records(&self) -> &[HistoryRecord] {
        &[]
    }

    fn attach_pull_request(&mut self, _: &str, _: &str, _: u64) -> Result<bool> {
        bail!("disk full")
    }

    fn clear(&mut self) -> Result<()> {
        bail!("disk full")
    }
}
