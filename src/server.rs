//! HTTP surface for the triage service.
//!
//! Provides:
//! - the GitHub webhook receiver, which always acknowledges
//! - a direct PR analysis endpoint
//! - integration status and health checks

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::TriageError;
use crate::orchestrator::{acknowledge, Acknowledgment, Orchestrator};

/// Header GitHub uses to name the webhook event type
pub const EVENT_HEADER: &str = "x-github-event";

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
}

impl ServerState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Which outbound integrations have credentials
    pub fn integration_status(&self) -> IntegrationStatus {
        let describe = |configured: bool, env: &str| {
            if configured {
                "configured".to_string()
            } else {
                format!("missing {env}")
            }
        };

        IntegrationStatus {
            github: describe(self.orchestrator.fetcher().has_token(), "GITHUB_TOKEN"),
            classifier: describe(
                self.orchestrator.classifier().is_configured(),
                "GEMINI_API_KEY",
            ),
            slack: describe(
                self.orchestrator.notifier().is_configured(),
                "SLACK_BOT_TOKEN",
            ),
        }
    }
}

/// Build the HTTP router
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/api/github-webhook",
            post(webhook_handler).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/analyze-pr", post(analyze_pr_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server
pub async fn run_server(state: Arc<ServerState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "PR triage server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Configuration state of each integration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrationStatus {
    pub github: String,
    pub classifier: String,
    pub slack: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    service: &'static str,
    status: &'static str,
    webhook_endpoint: &'static str,
    integrations: IntegrationStatus,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    pr_url: Option<String>,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(StatusResponse {
        service: "GitHub PR Triaging Agent",
        status: "running",
        webhook_endpoint: "/api/github-webhook",
        integrations: state.integration_status(),
    })
}

/// Takes the raw body with no size limit so that malformed or oversized
/// payloads are still acknowledged
async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Acknowledgment> {
    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(acknowledge(state.orchestrator.clone(), event_type, body.to_vec()))
}

async fn analyze_pr_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let reject = |status: StatusCode, code: &str, message: String| {
        (
            status,
            Json(json!({"ok": false, "code": code, "message": message})),
        )
    };

    let request: AnalyzeRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => {
            return reject(
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Invalid JSON payload".to_string(),
            )
        }
    };

    let Some(pr_url) = request.pr_url.filter(|u| !u.trim().is_empty()) else {
        return reject(
            StatusCode::BAD_REQUEST,
            "MISSING_URL",
            "PR URL is required".to_string(),
        );
    };

    match state.orchestrator.analyze(pr_url.trim()).await {
        Ok((diff, assessment)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "verdict": assessment.verdict,
                "comment": assessment.comment,
                "pr_url": pr_url,
                "provenance": diff.provenance,
            })),
        ),
        Err(TriageError::InvalidInput(message)) => {
            reject(StatusCode::BAD_REQUEST, "INVALID_URL", message)
        }
        Err(e @ TriageError::DiffUnavailable { .. }) => {
            warn!(pr_url = %pr_url, error = %e, "Analysis failed to fetch diff");
            reject(
                StatusCode::BAD_GATEWAY,
                "FETCH_FAILED",
                "Failed to fetch PR diff. Check token permissions or try again later.".to_string(),
            )
        }
        Err(e) => {
            warn!(pr_url = %pr_url, error = %e, "Analysis failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string())
        }
    }
}
