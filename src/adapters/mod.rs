pub mod gemini;

pub use gemini::GeminiClassifier;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{TriageError, TriageResult};
use crate::models::{Assessment, Verdict};

/// Comment attached to the substituted verdict when classification fails
pub const UNAVAILABLE_COMMENT: &str = "AI analysis unavailable";

/// Anything that can turn diff text into a severity assessment
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, diff: &str) -> TriageResult<Assessment>;

    /// Whether the classifier has the credentials it needs
    fn is_configured(&self) -> bool {
        true
    }
}

/// Outcome of a guarded classification. Always carries an assessment;
/// `error` is set when the fallback was substituted.
#[derive(Debug)]
pub struct Classification {
    pub assessment: Assessment,
    pub error: Option<TriageError>,
}

/// Run the classifier on its own task so that an error or a panic both
/// become the `fallback` assessment.
pub async fn classify_guarded(
    classifier: Arc<dyn Classifier>,
    diff: &str,
    fallback: Verdict,
) -> Classification {
    let diff = diff.to_string();
    let result = match tokio::spawn(async move { classifier.classify(&diff).await }).await {
        Ok(result) => result,
        Err(e) => Err(TriageError::ClassificationUnavailable(format!(
            "classifier aborted: {e}"
        ))),
    };

    match result {
        Ok(assessment) => Classification {
            assessment,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, fallback = %fallback, "Classification failed, using fallback verdict");
            Classification {
                assessment: Assessment::new(fallback, UNAVAILABLE_COMMENT),
                error: Some(e),
            }
        }
    }
}

/// Classify a diff, substituting `fallback` on any failure. Never fails.
pub async fn classify_with_fallback(
    classifier: Arc<dyn Classifier>,
    diff: &str,
    fallback: Verdict,
) -> Assessment {
    classify_guarded(classifier, diff, fallback).await.assessment
}
