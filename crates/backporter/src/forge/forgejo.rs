use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};

use super::http::{authorize, build_client, read_json};
use super::wire;
use super::{Forge, NewPullRequest};
use crate::error::BackportError;
use crate::types::{CommitInfo, PullRequestInfo, RepoSlug};

/// Forgejo / Gitea `api/v1` adapter.
#[derive(Debug, Clone)]
pub struct Forgejo {
    api_url: String,
    auth: Option<String>,
    client: Client,
}

impl Forgejo {
    /// `base_url` is the instance root, e.g. `https://codeberg.org`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_url: format!("{}/api/v1", base_url.trim_end_matches('/')),
            auth: token.map(|t| format!("token {t}")),
            client: build_client(timeout)?,
        })
    }

    fn repo_url(&self, slug: &RepoSlug, tail: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, slug.owner, slug.repo, tail)
    }

    fn get(&self, url: impl reqwest::IntoUrl) -> RequestBuilder {
        authorize(self.client.get(url), self.auth.as_deref())
    }

    fn list_pulls(&self, slug: &RepoSlug, params: &[(&str, &str)]) -> Result<Vec<wire::PullRequest>> {
        let url = Url::parse_with_params(&self.repo_url(slug, "pulls"), params)
            .context("invalid Forgejo URL")?;
        let response = self.get(url).send().context("failed to reach Forgejo")?;
        read_json(response, "listing pull requests")
    }
}

impl Forge for Forgejo {
    fn name(&self) -> &'static str {
        "forgejo"
    }

    fn get_pull_request(&self, slug: &RepoSlug, number: u64) -> Result<PullRequestInfo> {
        let response = self
            .get(self.repo_url(slug, &format!("pulls/{number}")))
            .send()
            .context("failed to reach Forgejo")?;
        let pr: wire::PullRequest = read_json(response, &format!("fetching PR #{number}"))?;
        if !pr.is_merged() {
            return Err(BackportError::PullRequestNotMerged(number).into());
        }

        let mut info = pr.into_info();
        if info.merge_commit.is_empty() {
            bail!("PR #{number} has no merge commit");
        }
        let commit = self.get_commit(slug, &info.merge_commit)?;
        info.squashed = commit.is_squash();
        Ok(info)
    }

    fn get_commit(&self, slug: &RepoSlug, sha: &str) -> Result<CommitInfo> {
        let response = self
            .get(self.repo_url(slug, &format!("git/commits/{sha}")))
            .send()
            .context("failed to reach Forgejo")?;
        let commit: wire::Commit = read_json(response, &format!("fetching commit {sha}"))?;
        Ok(commit.into())
    }

    fn list_recent_pull_requests(
        &self,
        slug: &RepoSlug,
        limit: usize,
    ) -> Result<Vec<PullRequestInfo>> {
        let prs = self.list_pulls(
            slug,
            &[("state", "closed"), ("sort", "recentupdate"), ("limit", "50")],
        )?;

        let mut merged: Vec<PullRequestInfo> = prs
            .into_iter()
            .filter(wire::PullRequest::is_merged)
            .map(wire::PullRequest::into_info)
            .collect();
        merged.sort_by(|a, b| b.merged_at.cmp(&a.merged_at));
        merged.truncate(limit);
        Ok(merged)
    }

    fn list_open_pull_requests(
        &self,
        slug: &RepoSlug,
        head: Option<&str>,
    ) -> Result<Vec<PullRequestInfo>> {
        // no server-side head filter; narrow locally
        let prs = self.list_pulls(slug, &[("state", "open"), ("limit", "50")])?;
        Ok(prs
            .into_iter()
            .map(wire::PullRequest::into_info)
            .filter(|pr| head.is_none_or(|h| pr.head_branch == h))
            .collect())
    }

    fn create_pull_request(&self, slug: &RepoSlug, request: &NewPullRequest) -> Result<u64> {
        let payload = wire::CreatePullRequest {
            title: &request.title,
            body: &request.body,
            head: &request.head,
            base: &request.base,
        };
        let builder = self.client.post(self.repo_url(slug, "pulls")).json(&payload);
        let response = authorize(builder, self.auth.as_deref())
            .send()
            .context("failed to reach Forgejo")?;
        let created: wire::Created = read_json(response, "creating pull request")?;
        Ok(created.number)
    }
}
