//! GitHub implementation of the [Forge] trait, backed by octocrab.

use super::{CreatePr, CreatedPr, Forge, PrState, PrStatus, PrSummary, PrUpdate};
use crate::{
    errors::{PkError, PkResult},
    plan::MergeMethod,
};
use async_trait::async_trait;
use octocrab::Octocrab;
use std::time::Duration;

/// A GitHub client scoped to one repository.
pub struct GitHubForge {
    client: Octocrab,
    owner: String,
    repo: String,
    timeout: Duration,
}

impl GitHubForge {
    pub fn new(token: &str, owner: &str, repo: &str, timeout_secs: u64) -> PkResult<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()?;
        Ok(Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Runs a forge call under the per-call timeout.
    async fn timed<T, F>(&self, fut: F) -> PkResult<T>
    where
        F: std::future::Future<Output = Result<T, octocrab::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(PkError::ForgeUnreachable(format!(
                "request timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn find_open_pr_for_branch(&self, branch: &str) -> PkResult<Option<CreatedPr>> {
        let head = format!("{}:{}", self.owner, branch);
        let page = self
            .timed(
                self.client
                    .pulls(&self.owner, &self.repo)
                    .list()
                    .state(octocrab::params::State::Open)
                    .head(head)
                    .per_page(1)
                    .send(),
            )
            .await?;
        Ok(page.items.first().map(|pr| CreatedPr {
            id: pr.number,
            url: pr.html_url.as_ref().map(|u| u.to_string()),
            existing: true,
        }))
    }
}

#[async_trait]
impl Forge for GitHubForge {
    async fn create_pr(&self, req: &CreatePr) -> PkResult<CreatedPr> {
        // Idempotent on retry: an open PR for this branch is the PR.
        if let Some(existing) = self.find_open_pr_for_branch(&req.branch).await? {
            return Ok(existing);
        }
        let pr = self
            .timed(
                self.client
                    .pulls(&self.owner, &self.repo)
                    .create(&req.title, &req.branch, &req.base)
                    .body(&req.body)
                    .draft(req.draft)
                    .send(),
            )
            .await?;
        Ok(CreatedPr {
            id: pr.number,
            url: pr.html_url.as_ref().map(|u| u.to_string()),
            existing: false,
        })
    }

    async fn update_pr(&self, id: u64, update: &PrUpdate) -> PkResult<()> {
        let pulls = self.client.pulls(&self.owner, &self.repo);
        let mut builder = pulls.update(id);
        if let Some(base) = &update.base {
            builder = builder.base(base);
        }
        if let Some(title) = &update.title {
            builder = builder.title(title);
        }
        if let Some(body) = &update.body {
            builder = builder.body(body);
        }
        self.timed(builder.send()).await?;
        // Draft state has no REST field on update; flipping it is done via
        // the dedicated endpoints, which we only need at create time.
        Ok(())
    }

    async fn close_pr(&self, id: u64) -> PkResult<()> {
        self.timed(
            self.client
                .pulls(&self.owner, &self.repo)
                .update(id)
                .state(octocrab::params::pulls::State::Closed)
                .send(),
        )
        .await?;
        Ok(())
    }

    async fn merge_pr(&self, id: u64, method: MergeMethod) -> PkResult<()> {
        let method = match method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        };
        self.timed(
            self.client
                .pulls(&self.owner, &self.repo)
                .merge(id)
                .method(method)
                .send(),
        )
        .await?;
        Ok(())
    }

    async fn pr_body(&self, id: u64) -> PkResult<String> {
        let pr = self
            .timed(self.client.pulls(&self.owner, &self.repo).get(id))
            .await?;
        Ok(pr.body.unwrap_or_default())
    }

    async fn pr_status(&self, id: u64) -> PkResult<PrStatus> {
        let pr = self
            .timed(self.client.pulls(&self.owner, &self.repo).get(id))
            .await?;

        let state = if pr.merged_at.is_some() {
            PrState::Merged
        } else if matches!(pr.state, Some(octocrab::models::IssueState::Closed)) {
            PrState::Closed
        } else {
            PrState::Open
        };

        // CI rollup for the head commit, via the combined-status endpoint.
        let ci = match &pr.head.sha {
            sha if !sha.is_empty() => {
                let path = format!(
                    "/repos/{}/{}/commits/{}/status",
                    self.owner, self.repo, sha
                );
                let combined: serde_json::Value = self
                    .timed(self.client.get(path, None::<&()>))
                    .await
                    .unwrap_or(serde_json::Value::Null);
                combined
                    .get("state")
                    .and_then(|s| s.as_str())
                    .unwrap_or("unknown")
                    .to_string()
            }
            _ => "unknown".to_string(),
        };

        // Latest review verdict, if any.
        let path = format!("/repos/{}/{}/pulls/{}/reviews", self.owner, self.repo, id);
        let reviews: serde_json::Value = self
            .timed(self.client.get(path, None::<&()>))
            .await
            .unwrap_or(serde_json::Value::Null);
        let review = reviews
            .as_array()
            .and_then(|arr| arr.last())
            .and_then(|r| r.get("state"))
            .and_then(|s| s.as_str())
            .unwrap_or("none")
            .to_lowercase();

        Ok(PrStatus { state, review, ci })
    }

    async fn list_prs(&self) -> PkResult<Vec<PrSummary>> {
        let page = self
            .timed(
                self.client
                    .pulls(&self.owner, &self.repo)
                    .list()
                    .state(octocrab::params::State::Open)
                    .per_page(100)
                    .send(),
            )
            .await?;
        Ok(page
            .items
            .into_iter()
            .map(|pr| PrSummary {
                branch: pr.head.ref_field.clone(),
                id: pr.number,
                state: PrState::Open,
            })
            .collect())
    }
}
