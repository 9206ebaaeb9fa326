use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, instrument, warn};

use super::diff::{resolve_pr_ref, summarize};
use super::retry::{parse_retry_after, RetryPolicy};
use crate::config::GitHubConfig;
use crate::error::{TriageError, TriageResult};
use crate::models::{DiffResult, PrRef, Provenance, PullRequest};

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

/// Fetches pull request diffs: authenticated API first, with retry, then the
/// public raw diff endpoint.
pub struct DiffFetcher {
    client: Client,
    api_base: String,
    raw_diff_base: String,
    user_agent: String,
    token: Option<String>,
    policy: RetryPolicy,
}

impl DiffFetcher {
    /// Create a fetcher. Without a token the primary transport is skipped.
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create GitHub HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            raw_diff_base: config.raw_diff_base.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            token,
            policy: RetryPolicy::from_config(&config.retry),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Fetch the diff for a webhook pull request reference
    #[instrument(skip(self, pr), fields(pr_url = pr.display_url()))]
    pub async fn fetch(&self, pr: &PullRequest) -> TriageResult<DiffResult> {
        let pr_ref = resolve_pr_ref(pr)?;
        self.fetch_ref(&pr_ref).await
    }

    /// Fetch the diff for an already-validated PR reference
    pub async fn fetch_ref(&self, pr_ref: &PrRef) -> TriageResult<DiffResult> {
        info!(pr = %pr_ref, "Fetching PR diff");

        let mut primary_attempts = 0;

        match self.token.as_deref() {
            Some(token) => match self.fetch_primary(pr_ref, token).await {
                Ok((text, attempts)) => {
                    return Ok(self.finish(pr_ref, text, Provenance::Primary, attempts));
                }
                Err((e, attempts)) => {
                    primary_attempts = attempts;
                    warn!(
                        pr = %pr_ref,
                        attempts,
                        error = %e,
                        "Primary diff transport failed, trying fallback"
                    );
                }
            },
            None => debug!("No GitHub token configured, skipping primary transport"),
        }

        match self.fetch_fallback(pr_ref).await {
            Ok(text) => Ok(self.finish(pr_ref, text, Provenance::Fallback, primary_attempts)),
            Err(e) => {
                warn!(pr = %pr_ref, error = %e, "Fallback diff transport failed");
                Err(TriageError::DiffUnavailable {
                    last_error: Box::new(e),
                })
            }
        }
    }

    async fn fetch_primary(
        &self,
        pr_ref: &PrRef,
        token: &str,
    ) -> std::result::Result<(String, u32), (TriageError, u32)> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, pr_ref.owner, pr_ref.repo, pr_ref.number
        );
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match self
                .client
                .get(&url)
                .header(ACCEPT, DIFF_MEDIA_TYPE)
                .header(USER_AGENT, &self.user_agent)
                .bearer_auth(token)
                .send()
                .await
            {
                Ok(response) => self.read_diff(response).await,
                Err(e) => Err(TriageError::from(e)),
            };

            match result {
                Ok(text) => return Ok((text, attempt)),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt, e.retry_after());
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Diff fetch failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }

    async fn fetch_fallback(&self, pr_ref: &PrRef) -> TriageResult<String> {
        let url = format!(
            "{}/{}/{}/pull/{}.diff",
            self.raw_diff_base, pr_ref.owner, pr_ref.repo, pr_ref.number
        );

        debug!(url = %url, "Fetching raw diff");

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        self.read_diff(response).await
    }

    async fn read_diff(&self, response: Response) -> TriageResult<String> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.text().await?);
        }

        if self.policy.is_retryable_status(status) {
            let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                parse_retry_after(response.headers())
            } else {
                None
            };
            return Err(TriageError::TransientUpstream {
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(TriageError::PermanentUpstream {
            status: status.as_u16(),
            body,
        })
    }

    fn finish(
        &self,
        pr_ref: &PrRef,
        text: String,
        provenance: Provenance,
        primary_attempts: u32,
    ) -> DiffResult {
        let stats = summarize(&text);

        info!(
            pr = %pr_ref,
            provenance = ?provenance,
            primary_attempts,
            bytes = text.len(),
            files = stats.files,
            "Fetched PR diff"
        );

        DiffResult {
            pr: pr_ref.clone(),
            text,
            provenance,
            primary_attempts,
            stats,
            fetched_at: Utc::now(),
        }
    }
}
