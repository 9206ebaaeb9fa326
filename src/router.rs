use crate::config::ChannelConfig;
use crate::models::{Assessment, RoutingDecision, Verdict};

/// Slack directive that notifies everyone active in the channel
pub const MENTION_ALL: &str = "<!here>";

/// Static verdict → channel mapping
#[derive(Debug, Clone, Default)]
pub struct ChannelRouter {
    channels: ChannelConfig,
}

impl ChannelRouter {
    pub fn new(channels: ChannelConfig) -> Self {
        Self { channels }
    }

    /// Pick the channel and render the message for an assessment.
    /// Total over every verdict; only CRITICAL mentions the channel.
    pub fn route(&self, assessment: &Assessment, pr_url: &str) -> RoutingDecision {
        let comment = escape_mrkdwn(assessment.comment.trim());
        let pr_url = escape_mrkdwn(pr_url);

        let (channel, mention_all, message) = match assessment.verdict {
            Verdict::Critical => (
                &self.channels.urgent,
                true,
                format!("🚨 CRITICAL PR: {MENTION_ALL} AI found a critical issue. {comment} {pr_url}"),
            ),
            Verdict::NeedsReview => (
                &self.channels.main,
                false,
                format!("👀 Review Needed: {comment} {pr_url}"),
            ),
            Verdict::Good => (
                &self.channels.feed,
                false,
                format!("✅ PR Approved: AI review passed. {comment} {pr_url}"),
            ),
            Verdict::Unknown => (
                &self.channels.main,
                false,
                format!("⚠️ Automated triage degraded, please review manually: {comment} {pr_url}"),
            ),
        };

        RoutingDecision {
            verdict: assessment.verdict,
            channel: channel.clone(),
            message,
            mention_all,
        }
    }
}

/// Escape the control characters of Slack message text, so model output
/// cannot inject mentions such as `<!channel>` or links
pub fn escape_mrkdwn(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
