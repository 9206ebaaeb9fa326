use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::adapters::{classify_guarded, classify_with_fallback, Classifier};
use crate::error::TriageResult;
use crate::github::{parse_pr_url, DiffFetcher};
use crate::models::{
    Assessment, DiffResult, Provenance, PullRequest, PullRequestEvent, Verdict,
};
use crate::notifications::Notifier;
use crate::router::ChannelRouter;

/// `X-GitHub-Event` value the pipeline acts on
pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// The only pull request action that triggers triage
pub const OPENED_ACTION: &str = "opened";

/// GitHub caps webhook payloads at 25 MB
pub const DEFAULT_MAX_EVENT_BYTES: usize = 25 * 1024 * 1024;

/// Pipeline states, in the order a fully successful run visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Validated,
    DiffFetched,
    Classified,
    Routed,
    Acknowledged,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::DiffFetched => "diff_fetched",
            Stage::Classified => "classified",
            Stage::Routed => "routed",
            Stage::Acknowledged => "acknowledged",
        }
    }
}

/// A stage that failed and was degraded past
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: String,
}

/// What happened during one pipeline run. Only ever logged; the caller of
/// the webhook sees the fixed [`Acknowledgment`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    /// States visited, starting at `Received` and ending at `Acknowledged`
    pub stages: Vec<Stage>,
    pub ignored: Option<String>,
    pub provenance: Option<Provenance>,
    pub verdict: Option<Verdict>,
    pub channel: Option<String>,
    pub delivered: bool,
    pub failures: Vec<StageFailure>,
}

impl PipelineOutcome {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            stages: vec![Stage::Received],
            ignored: None,
            provenance: None,
            verdict: None,
            channel: None,
            delivered: false,
            failures: Vec::new(),
        }
    }

    pub fn reached(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    fn advance(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    fn fail(&mut self, stage: Stage, error: impl ToString) {
        let error = error.to_string();
        error!(stage = stage.as_str(), error = %error, "Pipeline stage failed");
        self.failures.push(StageFailure { stage, error });
    }
}

/// Fixed response returned to every webhook caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgment {
    pub status: &'static str,
}

impl Acknowledgment {
    pub const fn accepted() -> Self {
        Self { status: "accepted" }
    }
}

/// Drives diff fetch → classification → routing for a single event
pub struct Orchestrator {
    fetcher: DiffFetcher,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
    router: ChannelRouter,
    fallback_verdict: Verdict,
    max_event_bytes: usize,
}

impl Orchestrator {
    pub fn new(
        fetcher: DiffFetcher,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
        router: ChannelRouter,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            notifier,
            router,
            fallback_verdict: Verdict::NeedsReview,
            max_event_bytes: DEFAULT_MAX_EVENT_BYTES,
        }
    }

    /// Verdict substituted when the classifier fails
    pub fn with_fallback_verdict(mut self, verdict: Verdict) -> Self {
        self.fallback_verdict = verdict;
        self
    }

    /// Bodies larger than this are ignored without being parsed
    pub fn with_max_event_bytes(mut self, max_event_bytes: usize) -> Self {
        self.max_event_bytes = max_event_bytes;
        self
    }

    pub fn fetcher(&self) -> &DiffFetcher {
        &self.fetcher
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Run the pipeline for one webhook delivery. Never fails: every stage
    /// error is logged and recorded in the outcome.
    pub async fn run(&self, event_type: Option<&str>, body: &[u8]) -> PipelineOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", run_id = %run_id);

        async move {
            let mut outcome = PipelineOutcome::new(run_id);

            match validate(event_type, body, self.max_event_bytes) {
                Ok(pr) => {
                    outcome.advance(Stage::Validated);
                    self.triage(&pr, &mut outcome).await;
                }
                Err(reason) => {
                    info!(reason = %reason, "Ignoring event");
                    outcome.ignored = Some(reason);
                }
            }

            outcome.advance(Stage::Acknowledged);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn triage(&self, pr: &PullRequest, outcome: &mut PipelineOutcome) {
        let pr_url = pr.display_url();
        info!(pr_url, "Processing PR");

        let diff = match self.fetcher.fetch(pr).await {
            Ok(diff) => {
                outcome.provenance = Some(diff.provenance);
                outcome.advance(Stage::DiffFetched);
                Some(diff)
            }
            Err(e) => {
                outcome.fail(Stage::DiffFetched, &e);
                None
            }
        };

        let assessment = match diff {
            Some(diff) => {
                let classification =
                    classify_guarded(self.classifier.clone(), &diff.text, self.fallback_verdict)
                        .await;
                if let Some(e) = &classification.error {
                    outcome.fail(Stage::Classified, e);
                }
                classification.assessment
            }
            None => Assessment::new(
                Verdict::Unknown,
                "The diff could not be retrieved, so automated triage was skipped.",
            ),
        };

        info!(verdict = %assessment.verdict, comment = %assessment.comment, "PR assessed");
        outcome.verdict = Some(assessment.verdict);
        outcome.advance(Stage::Classified);

        let decision = self.router.route(&assessment, pr_url);
        outcome.channel = Some(decision.channel.clone());

        match self.notifier.post(&decision.channel, &decision.message).await {
            Ok(_) => outcome.delivered = true,
            Err(e) => {
                outcome.fail(Stage::Routed, &e);
                warn!(
                    pr_url,
                    verdict = %assessment.verdict,
                    "Notification failed; PR triage was not delivered"
                );
            }
        }
        outcome.advance(Stage::Routed);
    }

    /// Fetch and classify a single PR by URL without notifying anyone
    pub async fn analyze(&self, pr_url: &str) -> TriageResult<(DiffResult, Assessment)> {
        let pr_ref = parse_pr_url(pr_url)?;
        let diff = self.fetcher.fetch_ref(&pr_ref).await?;
        let assessment =
            classify_with_fallback(self.classifier.clone(), &diff.text, self.fallback_verdict)
                .await;
        Ok((diff, assessment))
    }
}

/// Accept only `pull_request` events whose action is `opened` and that carry
/// a pull request. Anything else is ignored with the returned reason.
fn validate(
    event_type: Option<&str>,
    body: &[u8],
    max_event_bytes: usize,
) -> Result<PullRequest, String> {
    if event_type != Some(PULL_REQUEST_EVENT) {
        return Err(format!(
            "event type is {}, not {PULL_REQUEST_EVENT}",
            event_type.unwrap_or("missing")
        ));
    }

    if body.len() > max_event_bytes {
        return Err(format!(
            "body is {} bytes, over the {max_event_bytes} byte limit",
            body.len()
        ));
    }

    let event: PullRequestEvent = serde_json::from_slice(body)
        .map_err(|e| format!("body is not a pull request payload: {e}"))?;

    match event.action.as_deref() {
        Some(OPENED_ACTION) => {}
        other => {
            return Err(format!(
                "action is {}, not {OPENED_ACTION}",
                other.unwrap_or("missing")
            ))
        }
    }

    event
        .pull_request
        .ok_or_else(|| "payload has no pull_request".to_string())
}

/// Run the pipeline on its own task. The handle resolves to the outcome, or
/// `None` if the run panicked; either way the result has already been logged.
pub fn dispatch(
    orchestrator: Arc<Orchestrator>,
    event_type: Option<String>,
    body: Vec<u8>,
) -> JoinHandle<Option<PipelineOutcome>> {
    let run = tokio::spawn(async move { orchestrator.run(event_type.as_deref(), &body).await });

    tokio::spawn(async move {
        match run.await {
            Ok(outcome) => {
                info!(
                    run_id = %outcome.run_id,
                    verdict = ?outcome.verdict,
                    channel = ?outcome.channel,
                    delivered = outcome.delivered,
                    failures = outcome.failures.len(),
                    "Pipeline run complete"
                );
                Some(outcome)
            }
            Err(e) => {
                error!(error = %e, "Pipeline run aborted");
                None
            }
        }
    })
}

/// Outer boundary: start the run in the background and acknowledge at once,
/// so neither failures nor slow upstreams reach the webhook caller.
pub fn acknowledge(
    orchestrator: Arc<Orchestrator>,
    event_type: Option<String>,
    body: Vec<u8>,
) -> Acknowledgment {
    drop(dispatch(orchestrator, event_type, body));
    Acknowledgment::accepted()
}
