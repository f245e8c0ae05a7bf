//! Ledger of completed backports.
//!
//! [`JsonHistory`] reads its whole file on open and rewrites it atomically on
//! every mutation. Concurrent writers to one file are not coordinated.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successful backport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub original_sha: String,
    pub backport_sha: String,
    pub target_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

impl HistoryRecord {
    pub fn new(
        original_sha: impl Into<String>,
        backport_sha: impl Into<String>,
        target_branch: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            original_sha: original_sha.into(),
            backport_sha: backport_sha.into(),
            target_branch: target_branch.into(),
            pr_number: None,
            created_at: Utc::now(),
            message: message.into(),
        }
    }

    /// First line of the original message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Append-only record store.
pub trait HistoryStore {
    fn append(&mut self, record: HistoryRecord) -> Result<()>;

    /// All records, oldest first.
    fn records(&self) -> &[HistoryRecord];

    /// Set the pull request number on the latest record for `original_sha`
    /// on `target_branch`. Returns whether a record matched.
    fn attach_pull_request(
        &mut self,
        original_sha: &str,
        target_branch: &str,
        number: u64,
    ) -> Result<bool>;

    fn clear(&mut self) -> Result<()>;

    fn find_by_original(&self, sha: &str) -> Vec<&HistoryRecord> {
        self.records()
            .iter()
            .filter(|r| r.original_sha == sha || r.original_sha.starts_with(sha))
            .collect()
    }

    fn find_by_pull_request(&self, number: u64) -> Vec<&HistoryRecord> {
        self.records()
            .iter()
            .filter(|r| r.pr_number == Some(number))
            .collect()
    }
}

fn attach(records: &mut [HistoryRecord], original_sha: &str, target: &str, number: u64) -> bool {
    match records
        .iter_mut()
        .rev()
        .find(|r| r.original_sha == original_sha && r.target_branch == target)
    {
        Some(record) => {
            record.pr_number = Some(number);
            true
        }
        None => false,
    }
}

/// History kept only for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Vec<HistoryRecord>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&mut self, record: HistoryRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    fn attach_pull_request(
        &mut self,
        original_sha: &str,
        target_branch: &str,
        number: u64,
    ) -> Result<bool> {
        Ok(attach(&mut self.records, original_sha, target_branch, number))
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}

/// History persisted as a pretty-printed JSON array.
#[derive(Debug)]
pub struct JsonHistory {
    path: PathBuf,
    records: Vec<HistoryRecord>,
}

impl JsonHistory {
    /// Load `path`. A missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read history file {}", path.display()))?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse history file {}", path.display()))?
            }
        } else {
            Vec::new()
        };
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        atomic_write_json(&self.path, &self.records)
    }
}

impl HistoryStore for JsonHistory {
    fn append(&mut self, record: HistoryRecord) -> Result<()> {
        self.records.push(record);
        if let Err(err) = self.save() {
            self.records.pop();
            return Err(err);
        }
        Ok(())
    }

    fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    fn attach_pull_request(
        &mut self,
        original_sha: &str,
        target_branch: &str,
        number: u64,
    ) -> Result<bool> {
        if !attach(&mut self.records, original_sha, target_branch, number) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.save()
    }
}

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value).context("failed to serialize history")?;

    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create tmp file {}", tmp.display()))?;
        f.write_all(&data)
            .with_context(|| format!("failed to write tmp file {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to rename tmp file {} to {}",
            tmp.display(),
            path.display()
        )
    })
}
