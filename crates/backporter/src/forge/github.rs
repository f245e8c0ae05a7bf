use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};

use super::http::{authorize, build_client, read_json};
use super::wire;
use super::{Forge, NewPullRequest};
use crate::error::BackportError;
use crate::types::{CommitInfo, PullRequestInfo, RepoSlug};

pub const GITHUB_API: &str = "https://api.github.com";

/// GitHub REST v3 adapter.
#[derive(Debug, Clone)]
pub struct GitHub {
    base_url: String,
    auth: Option<String>,
    client: Client,
}

impl GitHub {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: token.map(|t| format!("Bearer {t}")),
            client: build_client(timeout)?,
        })
    }

    fn repo_url(&self, slug: &RepoSlug, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_url, slug.owner, slug.repo, tail
        )
    }

    fn get(&self, url: impl reqwest::IntoUrl) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        authorize(request, self.auth.as_deref())
    }
}

impl Forge for GitHub {
    fn name(&self) -> &'static str {
        "github"
    }

    fn get_pull_request(&self, slug: &RepoSlug, number: u64) -> Result<PullRequestInfo> {
        let response = self
            .get(self.repo_url(slug, &format!("pulls/{number}")))
            .send()
            .context("failed to reach GitHub")?;
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
            .get(self.repo_url(slug, &format!("commits/{sha}")))
            .send()
            .context("failed to reach GitHub")?;
        let commit: wire::Commit = read_json(response, &format!("fetching commit {sha}"))?;
        Ok(commit.into())
    }

    fn list_recent_pull_requests(
        &self,
        slug: &RepoSlug,
        limit: usize,
    ) -> Result<Vec<PullRequestInfo>> {
        let url = Url::parse_with_params(
            &self.repo_url(slug, "pulls"),
            &[
                ("state", "closed"),
                ("sort", "updated"),
                ("direction", "desc"),
                ("per_page", "100"),
            ],
        )
        .context("invalid GitHub URL")?;
        let response = self.get(url).send().context("failed to reach GitHub")?;
        let prs: Vec<wire::PullRequest> = read_json(response, "listing pull requests")?;

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
        let mut params = vec![("state", "open".to_string()), ("per_page", "100".to_string())];
        if let Some(branch) = head {
            params.push(("head", format!("{}:{branch}", slug.owner)));
        }
        let url = Url::parse_with_params(&self.repo_url(slug, "pulls"), &params)
            .context("invalid GitHub URL")?;
        let response = self.get(url).send().context("failed to reach GitHub")?;
        let prs: Vec<wire::PullRequest> = read_json(response, "listing open pull requests")?;

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
        let builder = self
            .client
            .post(self.repo_url(slug, "pulls"))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&payload);
        let response = authorize(builder, self.auth.as_deref())
            .send()
            .context("failed to reach GitHub")?;
        let created: wire::Created = read_json(response, "creating pull request")?;
        Ok(created.number)
    }
}
