use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SlackConfig;
use crate::error::{TriageError, TriageResult};

/// Acknowledgement from a successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel: String,
    /// Provider message id, when the provider returns one
    pub message_id: Option<String>,
}

/// Posts a rendered message to a named channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, channel: &str, message: &str) -> TriageResult<DeliveryReceipt>;

    /// Whether the notifier has the credentials it needs
    fn is_configured(&self) -> bool {
        true
    }
}

/// Slack `chat.postMessage` notifier authenticated with a bot token
pub struct SlackNotifier {
    client: Client,
    api_base: String,
    bot_token: Option<String>,
}

#[derive(Serialize)]
struct SlackMessage {
    channel: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<Vec<SlackBlock>>,
}

#[derive(Serialize)]
struct SlackBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<SlackText>,
}

#[derive(Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    text_type: String,
    text: String,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig, bot_token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create Slack HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post(&self, channel: &str, message: &str) -> TriageResult<DeliveryReceipt> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| TriageError::DeliveryFailed("SLACK_BOT_TOKEN not set".to_string()))?;

        debug!(channel, "Sending Slack notification");

        let payload = SlackMessage {
            channel: channel.to_string(),
            text: message.to_string(),
            blocks: Some(vec![SlackBlock {
                block_type: "section".to_string(),
                text: Some(SlackText {
                    text_type: "mrkdwn".to_string(),
                    text: message.to_string(),
                }),
            }]),
        };

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TriageError::DeliveryFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack notification failed");
            return Err(TriageError::DeliveryFailed(format!(
                "Slack returned {status}: {body}"
            )));
        }

        // Slack reports most failures as 200 with ok=false
        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| TriageError::DeliveryFailed(format!("malformed Slack response: {e}")))?;

        if !body.ok {
            let error = body.error.unwrap_or_else(|| "unknown_error".to_string());
            warn!(channel, error = %error, "Slack API error");
            return Err(TriageError::DeliveryFailed(format!("Slack API error: {error}")));
        }

        info!(channel, ts = ?body.ts, "Slack notification sent");

        Ok(DeliveryReceipt {
            channel: channel.to_string(),
            message_id: body.ts,
        })
    }

    fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer, token: Option<&str>) -> SlackNotifier {
        let config = SlackConfig {
            api_base: server.uri(),
            ..Default::default()
        };
        SlackNotifier::new(&config, token.map(str::to_string)).unwrap()
    }

    #[tokio::test]
    async fn test_post_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(json!({"channel": "#dev-feed", "text": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "ts": "1700.01"})))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = notifier(&server, Some("xoxb-test"))
            .post("#dev-feed", "hello")
            .await
            .unwrap();

        assert_eq!(receipt.channel, "#dev-feed");
        assert_eq!(receipt.message_id.as_deref(), Some("1700.01"));
    }

    #[tokio::test]
    async fn test_slack_error_payload_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "channel_not_found"})),
            )
            .mount(&server)
            .await;

        let err = notifier(&server, Some("xoxb-test"))
            .post("#nowhere", "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, TriageError::DeliveryFailed(_)));
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let server = MockServer::start().await;
        let n = notifier(&server, None);
        assert!(!n.is_configured());

        let err = n.post("#dev-main", "hello").await.unwrap_err();
        assert!(matches!(err, TriageError::DeliveryFailed(_)));
    }
}
