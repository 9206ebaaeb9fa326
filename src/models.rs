use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound webhook body. Only the fields the pipeline reads are modelled;
/// everything else in the GitHub payload is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub pull_request: Option<PullRequest>,
}

/// The pull request reference carried by an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub diff_url: Option<String>,
}

impl PullRequest {
    /// URL used when linking to the PR in notifications
    pub fn display_url(&self) -> &str {
        self.html_url
            .as_deref()
            .or(self.diff_url.as_deref())
            .unwrap_or("(unknown PR)")
    }
}

/// Owner, repository and number identifying a single pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Which transport produced a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Authenticated API request
    Primary,
    /// Unauthenticated raw diff endpoint
    Fallback,
}

/// Line counts for a unified diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub files: usize,
    pub additions: usize,
    pub deletions: usize,
}

/// A fetched diff and where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub pr: PrRef,
    pub text: String,
    pub provenance: Provenance,
    /// Number of primary transport attempts made, including failed ones
    pub primary_attempts: u32,
    pub stats: DiffStats,
    pub fetched_at: DateTime<Utc>,
}

/// Severity verdict for a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Good,
    NeedsReview,
    Critical,
    Unknown,
}

impl Verdict {
    pub const ALL: [Verdict; 4] = [
        Verdict::Good,
        Verdict::NeedsReview,
        Verdict::Critical,
        Verdict::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Good => "GOOD",
            Verdict::NeedsReview => "NEEDS_REVIEW",
            Verdict::Critical => "CRITICAL",
            Verdict::Unknown => "UNKNOWN",
        }
    }

    /// Parse a model's one-word answer. Surrounding whitespace, case and
    /// trailing punctuation are tolerated.
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .to_ascii_uppercase()
            .replace([' ', '-'], "_");

        match cleaned.as_str() {
            "GOOD" => Some(Verdict::Good),
            "NEEDS_REVIEW" => Some(Verdict::NeedsReview),
            "CRITICAL" => Some(Verdict::Critical),
            "UNKNOWN" => Some(Verdict::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict together with the classifier's short explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub comment: String,
}

impl Assessment {
    pub fn new(verdict: Verdict, comment: impl Into<String>) -> Self {
        Self {
            verdict,
            comment: comment.into(),
        }
    }
}

/// Where a notification goes and what it says
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub verdict: Verdict,
    pub channel: String,
    pub message: String,
    pub mention_all: bool,
}
