use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};

use backporter::cancel::CancelToken;
use backporter::ci::{self, CiPipeline, CiSettings, CiStatus};
use backporter::config::{BackporterConfig, REPO_CONFIG_FILE};
use backporter::engine::{BackportEngine, Reporter};
use backporter::environment::detect_ci;
use backporter::error::BackportError;
use backporter::forge::{self, Forge};
use backporter::git::{GitCli, VersionControl, parse_remote_url};
use backporter::history::{HistoryRecord, HistoryStore, JsonHistory};
use backporter::targets::{TargetBranchSpec, resolve_targets};
use backporter::types::{BackportOptions, OutcomeKind, RepoSlug};
use backporter::version;

mod output;

#[derive(Parser, Debug)]
#[command(name = "backporter", disable_version_flag = true)]
#[command(about = "Backport merged changes onto release branches")]
struct Cli {
    /// Print version information
    #[arg(short = 'V', long)]
    version: bool,

    /// Extra configuration file, applied over the global and repository files
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Remote to fetch from and push to (overrides `remote`)
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Forge HTTP timeout, e.g. 30s or 2m (overrides `http_timeout`)
    #[arg(long, global = true)]
    timeout: Option<String>,

    /// Print debug output (also enabled by BACKPORTER_VERBOSE=1)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cherry-pick a commit onto a release branch.
    Commit {
        /// Commit hash or any other git revision
        reference: String,
        /// Target branch (default: every configured target branch)
        target: Option<String>,
        /// Report what would happen without touching the repository.
        #[arg(long)]
        dry_run: bool,
    },
    /// Backport the squash commit of a merged pull request.
    Pr {
        number: u64,
        /// Target branch (default: every configured target branch)
        target: Option<String>,
        /// Report what would happen without touching the repository.
        #[arg(long)]
        dry_run: bool,
    },
    /// Backport the latest merge on the default branch to every target (CI only).
    Ci {
        /// Resolve targets and check for existing PRs, but change nothing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recorded backports.
    List {
        /// Only backports of this pull request
        #[arg(long)]
        pr: Option<u64>,
        /// Only backports of this commit (hash prefix)
        #[arg(long)]
        commit: Option<String>,
        /// Delete every recorded backport
        #[arg(long, conflicts_with_all = ["pr", "commit"])]
        clear: bool,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently merged pull requests.
    Recent {
        /// How many to show (default: `recent_pr_count`)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Write a commented .backporter.toml into the repository root.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

struct CliReporter {
    verbose: bool,
}

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }

    fn debug(&mut self, msg: &str) {
        if self.verbose {
            eprintln!("[debug] {msg}");
        }
    }
}

fn verbose_from_env() -> bool {
    env::var("BACKPORTER_VERBOSE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Clone, Copy)]
enum Change<'a> {
    Commit(&'a str),
    PullRequest(u64),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", version::full());
        return Ok(());
    }

    let mut reporter = CliReporter {
        verbose: cli.verbose || verbose_from_env(),
    };
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone(), &mut reporter);

    match &cli.cmd {
        None => {
            Cli::command().print_help()?;
            println!();
        }
        Some(Commands::Commit {
            reference,
            target,
            dry_run,
        }) => run_manual(
            &cli,
            Change::Commit(reference),
            target.as_deref(),
            *dry_run,
            &cancel,
            &mut reporter,
        )?,
        Some(Commands::Pr {
            number,
            target,
            dry_run,
        }) => run_manual(
            &cli,
            Change::PullRequest(*number),
            target.as_deref(),
            *dry_run,
            &cancel,
            &mut reporter,
        )?,
        Some(Commands::Ci { dry_run }) => run_ci(&cli, *dry_run, &cancel, &mut reporter)?,
        Some(Commands::List {
            pr,
            commit,
            clear,
            json,
        }) => run_list(&cli, *pr, commit.as_deref(), *clear, *json, &mut reporter)?,
        Some(Commands::Recent { limit }) => run_recent(&cli, *limit, &mut reporter)?,
        Some(Commands::Init { force }) => run_init(*force)?,
    }

    Ok(())
}

fn install_interrupt_handler(cancel: CancelToken, reporter: &mut dyn Reporter) {
    if let Err(err) = ctrlc::set_handler(move || cancel.cancel()) {
        reporter.warn(&format!("failed to install Ctrl-C handler: {err}"));
    }
}

fn parse_duration(s: &str) -> Result<Duration> {
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}

fn load_config(cli: &Cli, repo_root: Option<&Path>) -> Result<BackporterConfig> {
    let mut config = BackporterConfig::load(repo_root, cli.config.as_deref())?;
    if let Some(remote) = &cli.remote {
        config.remote = remote.clone();
    }
    if let Some(timeout) = &cli.timeout {
        config.http_timeout = parse_duration(timeout)?;
    }
    config.validate()?;
    Ok(config)
}

struct Repo {
    vcs: GitCli,
    config: BackporterConfig,
}

fn open_repo(cli: &Cli) -> Result<Repo> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    let vcs = GitCli::discover(&cwd)?;
    let config = load_config(cli, Some(vcs.root()))?;
    Ok(Repo { vcs, config })
}

fn connect_forge(config: &BackporterConfig) -> Result<Box<dyn Forge>> {
    let token = config.forge_kind()?.and_then(forge::token_from_env);
    Ok(forge::from_config(config, token)?)
}

fn repo_slug(vcs: &dyn VersionControl, remote: &str) -> Result<RepoSlug> {
    let url = vcs.remote_url(remote)?;
    parse_remote_url(&url)
        .ok_or_else(|| anyhow!("cannot determine owner/repo from {remote} URL {url}"))
}

fn open_history(
    config: &BackporterConfig,
    reporter: &mut dyn Reporter,
) -> Result<Option<JsonHistory>> {
    if !config.history.enabled {
        return Ok(None);
    }
    let Some(path) = config.history_path() else {
        reporter.warn("no cache directory available; backport history is not recorded");
        return Ok(None);
    };
    reporter.debug(&format!("history file: {}", path.display()));
    Ok(Some(JsonHistory::open(path)?))
}

/// Configured targets that exist locally, in configuration order.
fn configured_targets(repo: &Repo, reporter: &mut dyn Reporter) -> Result<Vec<String>> {
    if repo.config.target_branches.is_empty() {
        return Err(BackportError::NoTargetBranches.into());
    }
    let specs = TargetBranchSpec::parse_all(&repo.config.target_branches)?;
    let resolved = resolve_targets(&specs, &repo.vcs.list_branches()?);
    for missing in &resolved.missing {
        reporter.warn(&format!(
            "target branch {missing} does not exist locally; skipping"
        ));
    }
    if resolved.branches.is_empty() {
        bail!("none of the configured target branches exist locally");
    }
    Ok(resolved.branches)
}

fn run_manual(
    cli: &Cli,
    change: Change<'_>,
    target: Option<&str>,
    dry_run: bool,
    cancel: &CancelToken,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let repo = open_repo(cli)?;
    let targets = match target {
        Some(target) => vec![target.to_string()],
        None => configured_targets(&repo, reporter)?,
    };

    let forge = match change {
        Change::PullRequest(_) => Some(connect_forge(&repo.config)?),
        Change::Commit(_) => None,
    };
    let slug = match forge {
        Some(_) => Some(repo_slug(&repo.vcs, &repo.config.remote)?),
        None => None,
    };
    let mut history = open_history(&repo.config, reporter)?;

    let mut engine = BackportEngine::new(&repo.vcs);
    if let (Some(forge), Some(slug)) = (forge.as_deref(), slug) {
        engine = engine.with_forge(forge, slug);
    }
    if let Some(history) = history.as_mut() {
        engine = engine.with_history(history);
    }

    let mut outcomes = Vec::new();
    for target in &targets {
        if cancel.is_cancelled() {
            reporter.warn("interrupted; skipping remaining target branches");
            break;
        }
        let options = BackportOptions::new(target).dry_run(dry_run);
        let outcome = match change {
            Change::Commit(reference) => engine.backport_commit(reference, &options, reporter)?,
            Change::PullRequest(number) => {
                engine.backport_pull_request(number, &options, reporter)?
            }
        };
        println!("{}", output::outcome_line(&outcome));

        let stop = match &outcome.kind {
            OutcomeKind::Conflict { output } => {
                print!("{}", output::conflict_help(target, output));
                // the repository is mid-pick until the user resolves it
                true
            }
            _ => false,
        };
        outcomes.push(outcome);
        if stop {
            break;
        }
    }

    if targets.len() > 1 {
        println!("{}", output::summary_line(&outcomes));
    }

    let failed = outcomes
        .iter()
        .filter(|o| o.is_failed() || o.is_conflict())
        .count();
    if failed > 0 {
        return Err(BackportError::BackportsFailed {
            failed,
            total: outcomes.len(),
        }
        .into());
    }
    Ok(())
}

fn run_ci(
    cli: &Cli,
    dry_run: bool,
    cancel: &CancelToken,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let repo = open_repo(cli)?;
    let kind = repo.config.forge_kind()?.ok_or_else(|| {
        BackportError::ForgeNotConfigured("set forge_type to run the CI pipeline".to_string())
    })?;

    let ctx = ci::prepare(
        &repo.vcs,
        detect_ci(),
        repo.config.ci_identity(kind),
        reporter,
    )?;

    let forge = connect_forge(&repo.config)?;
    let slug = repo_slug(&repo.vcs, &repo.config.remote)?;
    reporter.info(&format!("repository {slug} on {}", forge.name()));
    let mut history = open_history(&repo.config, reporter)?;

    let mut pipeline = CiPipeline::new(
        &repo.vcs,
        forge.as_ref(),
        slug,
        CiSettings::from_config(&repo.config, dry_run),
    )
    .with_cancel(cancel.clone());
    if let Some(history) = history.as_mut() {
        pipeline = pipeline.with_history(history);
    }

    let report = pipeline.run(&ctx, reporter)?;
    if report.status == CiStatus::Completed {
        for line in report.summary_lines() {
            println!("{line}");
        }
    }
    report.into_result()?;
    Ok(())
}

fn run_list(
    cli: &Cli,
    pr: Option<u64>,
    commit: Option<&str>,
    clear: bool,
    json: bool,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    // works outside a repository too; only the repo config layer is skipped
    let root = GitCli::discover(&cwd)
        .ok()
        .map(|vcs| vcs.root().to_path_buf());
    let config = load_config(cli, root.as_deref())?;

    let Some(mut history) = open_history(&config, reporter)? else {
        bail!("backport history is disabled (history.enabled = false)");
    };

    if clear {
        let count = history.records().len();
        history.clear()?;
        println!("Cleared {count} backport record(s)");
        return Ok(());
    }

    let mut records: Vec<&HistoryRecord> = match pr {
        Some(number) => history.find_by_pull_request(number),
        None => history.records().iter().collect(),
    };
    if let Some(sha) = commit {
        records.retain(|r| r.original_sha.starts_with(sha));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", output::history_table(&records));
    }
    Ok(())
}

fn run_recent(cli: &Cli, limit: Option<usize>, reporter: &mut dyn Reporter) -> Result<()> {
    let repo = open_repo(cli)?;
    let forge = connect_forge(&repo.config)?;
    let slug = repo_slug(&repo.vcs, &repo.config.remote)?;
    let limit = limit.unwrap_or(repo.config.recent_pr_count);

    reporter.info(&format!(
        "fetching the last {limit} merged pull requests of {slug} from {}",
        forge.name()
    ));
    let prs = forge.list_recent_pull_requests(&slug, limit)?;
    print!("{}", output::recent_table(&prs, Utc::now()));
    Ok(())
}

fn run_init(force: bool) -> Result<()> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    let root = GitCli::discover(&cwd)
        .map(|vcs| vcs.root().to_path_buf())
        .unwrap_or(cwd);
    let path = root.join(REPO_CONFIG_FILE);

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    fs::write(&path, BackporterConfig::default_toml_template())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
