use std::time::Duration;

use thiserror::Error;

/// Failures inside the triage pipeline.
///
/// None of these ever reach the webhook caller; the pipeline logs them and
/// degrades to the best available result.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Malformed PR reference. Fails fast, no network call is made.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 429 or 5xx from an upstream; safe to retry.
    #[error("transient upstream error (HTTP {status})")]
    TransientUpstream {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// 4xx other than 429; retrying will not help.
    #[error("permanent upstream error (HTTP {status}): {body}")]
    PermanentUpstream { status: u16, body: String },

    /// Connection failure, timeout or unreadable body.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Primary and fallback transports both exhausted.
    #[error("diff unavailable: {last_error}")]
    DiffUnavailable {
        #[source]
        last_error: Box<TriageError>,
    },

    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
}

impl TriageError {
    /// Whether the retry loop may attempt the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientUpstream { .. } | Self::Transport(_))
    }

    /// Server-provided delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TransientUpstream { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type TriageResult<T> = std::result::Result<T, TriageError>;
