//! JSON shapes shared by the GitHub and Forgejo REST APIs.
//!
//! Both products return the same field names for the subset read here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommitInfo, PullRequestInfo};

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    /// Only present on single-item responses.
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub head: Branch,
    pub base: Branch,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.merged.unwrap_or(self.merged_at.is_some())
    }

    /// Convert without parent information; `squashed` stays false.
    pub fn into_info(self) -> PullRequestInfo {
        let merged = self.is_merged();
        PullRequestInfo {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            state: self.state,
            merge_commit: self.merge_commit_sha.unwrap_or_default(),
            head_sha: self.head.sha,
            head_branch: self.head.name,
            base_branch: self.base.name,
            merged,
            squashed: false,
            author: self.user.map(|u| u.login).unwrap_or_default(),
            merged_at: self.merged_at,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Branch {
    #[serde(rename = "ref")]
    pub name: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Label {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Commit {
    pub sha: String,
    pub commit: CommitDetail,
    #[serde(default)]
    pub parents: Vec<ParentRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: Option<Signature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Signature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParentRef {
    pub sha: String,
}

impl From<Commit> for CommitInfo {
    fn from(c: Commit) -> Self {
        let (author, email, timestamp) = match c.commit.author {
            Some(sig) => (sig.name, sig.email, sig.date),
            None => (String::new(), String::new(), None),
        };
        CommitInfo {
            sha: c.sha,
            message: c.commit.message,
            author,
            email,
            timestamp,
            parents: c.parents.into_iter().map(|p| p.sha).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Created {
    pub number: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub message: String,
}
