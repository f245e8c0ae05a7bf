//! Process execution for backporter.
//!
//! Every version-control mutation goes through an external process. This
//! crate runs those processes with captured output, exit code and duration
//! so callers can classify the result from what the tool printed.
//!
//! # Example
//!
//! ```ignore
//! use backporter_process::run_command_in_dir;
//!
//! let result = run_command_in_dir("git", &["rev-parse", "HEAD"], repo_root)?;
//! assert!(result.success);
//! ```

use std::path::Path;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandResult {
    /// Stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Trimmed stdout, for commands that print a single value.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Create a result from a process output
    pub fn from_output(output: &Output, duration: Duration) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Run a command in a specific directory
pub fn run_command_in_dir(program: &str, args: &[&str], dir: &Path) -> Result<CommandResult> {
    run_command_in_dir_with_env(program, args, dir, &[])
}

/// Run a command in a specific directory with extra environment variables
pub fn run_command_in_dir_with_env(
    program: &str,
    args: &[&str],
    dir: &Path,
    env: &[(String, String)],
) -> Result<CommandResult> {
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir);

    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = cmd.output().with_context(|| {
        format!(
            "failed to run command: {} {:?} in {}",
            program,
            args,
            dir.display()
        )
    })?;

    Ok(CommandResult::from_output(&output, start.elapsed()))
}

/// Check if a command exists in PATH
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}
