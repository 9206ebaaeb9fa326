use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::Verdict;
use crate::orchestrator::DEFAULT_MAX_EVENT_BYTES;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub classifier: ClassifierConfig,
    pub slack: SlackConfig,
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Webhook bodies over this size are acknowledged and ignored
    pub max_event_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_event_bytes: DEFAULT_MAX_EVENT_BYTES,
        }
    }
}

/// Diff source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Base URL for the authenticated REST API (primary transport)
    pub api_base: String,
    /// Base URL for unauthenticated raw diffs (fallback transport)
    pub raw_diff_base: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            raw_diff_base: "https://patch-diff.githubusercontent.com/raw".to_string(),
            user_agent: "GitHub-PR-Triaging-Agent".to_string(),
            timeout_secs: 10,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff settings for the primary diff transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_secs: 60,
        }
    }
}

/// AI classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Diff text beyond this many characters is not sent to the model
    pub max_diff_chars: usize,
    /// Verdict substituted when classification fails
    pub fallback_verdict: Verdict,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 30,
            max_diff_chars: 4000,
            fallback_verdict: Verdict::NeedsReview,
        }
    }
}

/// Slack delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base: String,
    pub timeout_secs: u64,
    pub channels: ChannelConfig,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".to_string(),
            timeout_secs: 10,
            channels: ChannelConfig::default(),
        }
    }
}

/// Destination channel per verdict class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub urgent: String,
    pub main: String,
    pub feed: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            urgent: "#dev-urgent".to_string(),
            main: "#dev-main".to_string(),
            feed: "#dev-feed".to_string(),
        }
    }
}

/// Credentials read from the environment. Never loaded from the config file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub github_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub slack_bot_token: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            github_token: read("GITHUB_TOKEN"),
            gemini_api_key: read("GEMINI_API_KEY"),
            slack_bot_token: read("SLACK_BOT_TOKEN"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("github_token", &mask(&self.github_token))
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("slack_bot_token", &mask(&self.slack_bot_token))
            .finish()
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }
}

impl GitHubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SlackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
