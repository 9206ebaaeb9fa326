use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::Classifier;
use crate::config::ClassifierConfig;
use crate::error::{TriageError, TriageResult};
use crate::models::{Assessment, Verdict};

const ANALYSIS_PROMPT: &str = "You are a senior software engineer acting as a code reviewer. \
Analyze the provided code diff and answer: What is the issue here? \
Respond in natural human language with a brief, clear explanation.";

const CLASSIFICATION_PROMPT: &str = "Based on the issue description, classify the severity as \
either 'CRITICAL', 'NEEDS_REVIEW', or 'GOOD'. \
Respond with only one word: CRITICAL, NEEDS_REVIEW, or GOOD.";

/// Two-step Gemini classifier: a free-text review of the diff, then a
/// one-word severity for that review.
pub struct GeminiClassifier {
    client: Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    max_diff_chars: usize,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create classifier HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_diff_chars: config.max_diff_chars,
        })
    }

    async fn generate(&self, api_key: &str, parts: &[&str]) -> TriageResult<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: parts
                    .iter()
                    .map(|p| Part {
                        text: p.to_string(),
                    })
                    .collect(),
            }],
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model);

        debug!(model = %self.model, "Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TriageError::ClassificationUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TriageError::ClassificationUnavailable(format!(
                "Gemini API error ({status}): {error_text}"
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            TriageError::ClassificationUnavailable(format!("malformed Gemini response: {e}"))
        })?;

        let text = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(TriageError::ClassificationUnavailable(
                "empty response from Gemini".to_string(),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    #[instrument(skip(self, diff), fields(model = %self.model, diff_bytes = diff.len()))]
    async fn classify(&self, diff: &str) -> TriageResult<Assessment> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            TriageError::ClassificationUnavailable("GEMINI_API_KEY not set".to_string())
        })?;

        info!("Starting AI analysis");

        let diff_part = format!("Code diff:\n\n{}", truncate_chars(diff, self.max_diff_chars));
        let analysis = self.generate(api_key, &[ANALYSIS_PROMPT, diff_part.as_str()]).await?;

        let label = self
            .generate(api_key, &[CLASSIFICATION_PROMPT, analysis.as_str()])
            .await?;

        Ok(Assessment::new(parse_verdict(&label), analysis.trim()))
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Map the model's one-word answer to a verdict. Anything unrecognised is
/// treated as needing review; the model never gets to pick UNKNOWN.
fn parse_verdict(label: &str) -> Verdict {
    match Verdict::from_label(label) {
        Some(Verdict::Unknown) | None => Verdict::NeedsReview,
        Some(v) => v,
    }
}

/// Prefix of `s` with at most `max` characters, cut on a char boundary
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn classifier(server: &MockServer, key: Option<&str>) -> GeminiClassifier {
        let config = ClassifierConfig {
            api_base: server.uri(),
            ..Default::default()
        };
        GeminiClassifier::new(&config, key.map(str::to_string)).unwrap()
    }

    fn reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        }))
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("CRITICAL\n"), Verdict::Critical);
        assert_eq!(parse_verdict("good"), Verdict::Good);
        assert_eq!(parse_verdict("UNKNOWN"), Verdict::NeedsReview);
        assert_eq!(parse_verdict("I think it's fine"), Verdict::NeedsReview);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[tokio::test]
    async fn test_two_step_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "key"))
            .and(body_string_contains("Code diff:"))
            .respond_with(reply("Adds a log line, nothing risky."))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_string_contains("classify the severity"))
            .respond_with(reply("GOOD"))
            .expect(1)
            .mount(&server)
            .await;

        let assessment = classifier(&server, Some("key")).classify("+line").await.unwrap();
        assert_eq!(assessment.verdict, Verdict::Good);
        assert_eq!(assessment.comment, "Adds a log line, nothing risky.");
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let server = MockServer::start().await;
        let c = classifier(&server, None);
        assert!(!c.is_configured());

        let err = c.classify("+line").await.unwrap_err();
        assert!(matches!(err, TriageError::ClassificationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_api_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = classifier(&server, Some("key")).classify("+line").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = classifier(&server, Some("key")).classify("+line").await.unwrap_err();
        assert!(matches!(err, TriageError::ClassificationUnavailable(_)));
    }
}
