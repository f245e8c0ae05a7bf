//! Plain-text rendering of command results.
//!
//! Everything here returns a `String` so `main` decides where it goes.

use std::fmt::Write as _;

use backporter::history::HistoryRecord;
use backporter::types::{BackportOutcome, PullRequestInfo};
use chrono::{DateTime, Utc};

const SHORT_SHA: usize = 8;
const TARGET_WIDTH: usize = 20;
const AUTHOR_WIDTH: usize = 16;

fn short(sha: &str) -> &str {
    sha.get(..SHORT_SHA).unwrap_or(sha)
}

/// `text` cut to `width` characters, with `...` marking the cut.
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn outcome_line(outcome: &BackportOutcome) -> String {
    let mut line = format!(
        "{:<8} {}: {}",
        outcome.short_state(),
        outcome.target_branch,
        outcome.message
    );
    if let Some(pr) = outcome.pull_request {
        let _ = write!(line, " (PR #{pr})");
    }
    line
}

/// Raw conflict output plus the commands that finish or drop the pick.
pub fn conflict_help(target: &str, output: &str) -> String {
    let mut text = String::new();
    let _ = writeln!(text);
    let _ = writeln!(text, "Cherry-pick onto {target} stopped on conflicts:");
    let _ = writeln!(text);
    for line in output.trim_end().lines() {
        let _ = writeln!(text, "    {line}");
    }
    let _ = writeln!(text);
    let _ = writeln!(text, "Resolve the conflicts, then run:");
    let _ = writeln!(text, "    git add <files>");
    let _ = writeln!(text, "    git cherry-pick --continue");
    let _ = writeln!(text, "or give up on this backport with:");
    let _ = writeln!(text, "    git cherry-pick --abort");
    text
}

pub fn summary_line(outcomes: &[BackportOutcome]) -> String {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = outcomes
        .iter()
        .filter(|o| o.is_failed() || o.is_conflict())
        .count();
    let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
    format!("{succeeded} succeeded, {failed} failed, {skipped} skipped")
}

pub fn history_table(records: &[&HistoryRecord]) -> String {
    if records.is_empty() {
        return "No backports recorded\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<10} {:<TARGET_WIDTH$} {:<7} {:<16} SUBJECT",
        "ORIGINAL", "BACKPORT", "TARGET", "PR", "DATE"
    );
    for record in records {
        let pr = record
            .pr_number
            .map(|n| format!("#{n}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<10} {:<10} {:<TARGET_WIDTH$} {:<7} {:<16} {}",
            short(&record.original_sha),
            short(&record.backport_sha),
            fit(&record.target_branch, TARGET_WIDTH),
            pr,
            record.created_at.format("%Y-%m-%d %H:%M").to_string(),
            record.subject()
        );
    }
    out
}

/// Coarse "how long ago" for the recent-PR listing.
pub fn age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..60 => "just now".to_string(),
        60..3_600 => format!("{}m ago", secs / 60),
        3_600..86_400 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

pub fn recent_table(prs: &[PullRequestInfo], now: DateTime<Utc>) -> String {
    if prs.is_empty() {
        return "No recently merged pull requests\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<7} {:<10} {:<AUTHOR_WIDTH$} {:<12} {:<8} TITLE",
        "PR", "MERGED", "AUTHOR", "BASE", "LABEL"
    );
    for pr in prs {
        let merged = pr
            .merged_at
            .map(|at| age(at, now))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<7} {:<10} {:<AUTHOR_WIDTH$} {:<12} {:<8} {}",
            format!("#{}", pr.number),
            merged,
            fit(&pr.author, AUTHOR_WIDTH),
            fit(&pr.base_branch, 12),
            if pr.has_backport_label() { "backport" } else { "-" },
            pr.title
        );
    }
    out
}
