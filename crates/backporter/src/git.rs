use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use backporter_process::{CommandResult, run_command_in_dir, run_command_in_dir_with_env};

use crate::environment::CommitIdentity;
use crate::types::RepoSlug;

/// Result of a cherry-pick attempt.
#[derive(Debug)]
pub enum PickResult {
    Applied,
    /// Git stopped mid-pick; `output` is its combined stdout and stderr.
    Conflict { output: String },
    Failed(anyhow::Error),
}

/// Repository inspection and mutation.
///
/// Every method acts on a single working tree. Callers must not drive two
/// operations against the same checkout at once.
pub trait VersionControl {
    /// Resolve any revision to a full commit hash, `None` if it does not exist.
    fn resolve_revision(&self, rev: &str) -> Result<Option<String>>;
    fn commit_message(&self, rev: &str) -> Result<String>;
    fn branch_exists(&self, name: &str) -> Result<bool>;
    fn list_branches(&self) -> Result<Vec<String>>;
    /// Branch names under `refs/remotes/<remote>/`, without the remote prefix.
    fn list_remote_branches(&self, remote: &str) -> Result<Vec<String>>;
    /// `None` on a detached HEAD.
    fn current_branch(&self) -> Result<Option<String>>;
    /// Modified or staged tracked files. Untracked files do not count.
    fn has_uncommitted_changes(&self) -> Result<bool>;
    fn checkout(&self, name: &str) -> Result<()>;
    fn create_branch(&self, name: &str, from: &str) -> Result<()>;
    fn delete_branch(&self, name: &str) -> Result<()>;
    fn cherry_pick(&self, sha: &str) -> PickResult;
    fn abort_cherry_pick(&self) -> Result<()>;
    fn continue_cherry_pick(&self) -> Result<()>;
    fn amend_message(&self, message: &str) -> Result<()>;
    /// Publish `branch`, replacing the remote copy only if it still matches
    /// the last fetched state.
    fn push(&self, remote: &str, branch: &str) -> Result<()>;
    fn fetch(&self, remote: &str) -> Result<()>;
    fn head_commit(&self) -> Result<String>;
    fn remote_url(&self, remote: &str) -> Result<String>;
    /// Set `user.name` / `user.email` where unset. Returns whether anything
    /// was written.
    fn ensure_identity(&self, identity: &CommitIdentity) -> Result<bool>;
}

/// Git must never wait on a terminal: no credential prompt, no editor.
fn non_interactive_env() -> [(String, String); 2] {
    [
        ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ("GIT_EDITOR".to_string(), "true".to_string()),
    ]
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    program: String,
}

impl GitCli {
    /// Drive the repository at `root` with `$BACKPORTER_GIT_BIN` or `git`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_program(root, git_program())
    }

    pub fn with_program(root: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            program: program.into(),
        }
    }

    /// Locate the top level of the repository containing `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let program = git_program();
        let out = run_command_in_dir(&program, &["rev-parse", "--show-toplevel"], dir)
            .context("failed to execute git; is git installed?")?;
        if !out.success {
            bail!("not a git repository: {}", dir.display());
        }
        Ok(Self::with_program(out.stdout_trimmed(), program))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> Result<CommandResult> {
        run_command_in_dir_with_env(&self.program, args, &self.root, &non_interactive_env())
            .context("failed to execute git; is git installed?")
    }

    /// Run and require success, returning trimmed stdout.
    fn run_ok(&self, args: &[&str]) -> Result<String> {
        let out = self.run(args)?;
        if !out.success {
            bail!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                out.combined().trim()
            );
        }
        Ok(out.stdout_trimmed().to_string())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>> {
        let stdout = self.run_ok(&["for-each-ref", "--format=%(refname)", prefix])?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.trim().strip_prefix(prefix))
            .filter(|name| !name.is_empty() && *name != "HEAD")
            .map(str::to_string)
            .collect())
    }

    fn config_value(&self, key: &str) -> Result<Option<String>> {
        let out = self.run(&["config", "--get", key])?;
        // exit 1 means the key is unset
        if !out.success {
            return Ok(None);
        }
        let value = out.stdout_trimmed();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }
}

impl VersionControl for GitCli {
    fn resolve_revision(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let out = self.run(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !out.success {
            return Ok(None);
        }
        let sha = out.stdout_trimmed();
        Ok((!sha.is_empty()).then(|| sha.to_string()))
    }

    fn commit_message(&self, rev: &str) -> Result<String> {
        let out = self.run(&["log", "-1", "--format=%B", rev])?;
        if !out.success {
            bail!("git log failed for {rev}: {}", out.combined().trim());
        }
        Ok(out.stdout.trim_end().to_string())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let reference = format!("refs/heads/{name}");
        let out = self.run(&["show-ref", "--verify", "--quiet", &reference])?;
        Ok(out.success)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        self.list_refs("refs/heads/")
    }

    fn list_remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        self.list_refs(&format!("refs/remotes/{remote}/"))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let branch = self.run_ok(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if branch == "HEAD" || branch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(branch))
        }
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let stdout = self.run_ok(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!stdout.is_empty())
    }

    fn checkout(&self, name: &str) -> Result<()> {
        self.run_ok(&["checkout", name])
            .with_context(|| format!("failed to checkout {name}"))?;
        Ok(())
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.run_ok(&["branch", name, from])
            .with_context(|| format!("failed to create branch {name} from {from}"))?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.run_ok(&["branch", "-D", name])
            .with_context(|| format!("failed to delete branch {name}"))?;
        Ok(())
    }

    fn cherry_pick(&self, sha: &str) -> PickResult {
        let out = match self.run(&["cherry-pick", sha]) {
            Ok(out) => out,
            Err(err) => return PickResult::Failed(err),
        };
        if out.success {
            return PickResult::Applied;
        }

        // git reports conflicts only through its output
        let output = out.combined();
        if is_conflict_output(&output) {
            PickResult::Conflict { output }
        } else {
            PickResult::Failed(anyhow!("git cherry-pick failed: {}", output.trim()))
        }
    }

    fn abort_cherry_pick(&self) -> Result<()> {
        self.run_ok(&["cherry-pick", "--abort"])?;
        Ok(())
    }

    fn continue_cherry_pick(&self) -> Result<()> {
        self.run_ok(&["cherry-pick", "--continue"])?;
        Ok(())
    }

    fn amend_message(&self, message: &str) -> Result<()> {
        self.run_ok(&["commit", "--amend", "-m", message])
            .context("failed to amend commit message")?;
        Ok(())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_ok(&["push", "--force-with-lease", "-u", remote, branch])
            .with_context(|| format!("failed to push {branch} to {remote}"))?;
        Ok(())
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        self.run_ok(&["fetch", remote])
            .with_context(|| format!("failed to fetch {remote}"))?;
        Ok(())
    }

    fn head_commit(&self) -> Result<String> {
        self.run_ok(&["rev-parse", "HEAD"])
    }

    fn remote_url(&self, remote: &str) -> Result<String> {
        self.run_ok(&["remote", "get-url", remote])
            .with_context(|| format!("remote {remote} is not configured"))
    }

    fn ensure_identity(&self, identity: &CommitIdentity) -> Result<bool> {
        let mut changed = false;
        if self.config_value("user.name")?.is_none() {
            self.run_ok(&["config", "user.name", &identity.name])?;
            changed = true;
        }
        if self.config_value("user.email")?.is_none() {
            self.run_ok(&["config", "user.email", &identity.email])?;
            changed = true;
        }
        Ok(changed)
    }
}

fn git_program() -> String {
    env::var("BACKPORTER_GIT_BIN").unwrap_or_else(|_| "git".to_string())
}

/// Whether cherry-pick output describes a merge conflict.
pub fn is_conflict_output(output: &str) -> bool {
    output.contains("CONFLICT") || output.contains("after resolving the conflicts")
}

/// Extract owner and repository from an SSH or HTTP(S) remote URL.
pub fn parse_remote_url(url: &str) -> Option<RepoSlug> {
    let url = url.trim();
    let path = if let Some((_, rest)) = url.split_once("://") {
        // scheme://[user@]host[:port]/owner/repo
        rest.split_once('/')?.1
    } else {
        // scp-like: [user@]host:owner/repo
        url.split_once(':')?.1
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let repo = segments.next()?;
    let owner = segments.next()?;
    Some(RepoSlug::new(owner, repo))
}
