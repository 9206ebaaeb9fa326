use reqwest::Url;

use crate::error::{TriageError, TriageResult};
use crate::models::{DiffStats, PrRef, PullRequest};

/// Parse a pull request URL into owner, repo and number.
///
/// Accepts the web URL (`https://github.com/o/r/pull/1`, optionally followed
/// by `/files` or similar, or with a `.diff`/`.patch` suffix) and the REST API
/// URL (`https://api.github.com/repos/o/r/pulls/1`).
pub fn parse_pr_url(url: &str) -> TriageResult<PrRef> {
    let invalid = || TriageError::InvalidInput(format!("not a GitHub pull request URL: {url}"));

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    if parsed.scheme() != "https" {
        return Err(invalid());
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();

    let (owner, repo, number) = match (parsed.host_str(), segments.as_slice()) {
        (Some("github.com"), [owner, repo, "pull", number, ..]) => (*owner, *repo, *number),
        (Some("api.github.com"), ["repos", owner, repo, "pulls", number, ..]) => {
            (*owner, *repo, *number)
        }
        _ => return Err(invalid()),
    };

    let number = number
        .strip_suffix(".diff")
        .or_else(|| number.strip_suffix(".patch"))
        .unwrap_or(number);

    if owner.is_empty() || repo.is_empty() || number.is_empty() {
        return Err(invalid());
    }

    let number: u64 = number.parse().map_err(|_| invalid())?;

    Ok(PrRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}

/// Resolve the PR reference for a webhook pull request, preferring the
/// canonical `html_url` over `diff_url`.
pub fn resolve_pr_ref(pr: &PullRequest) -> TriageResult<PrRef> {
    let candidates = [pr.html_url.as_deref(), pr.diff_url.as_deref()];
    let mut last_err = None;

    for url in candidates.into_iter().flatten() {
        match parse_pr_url(url) {
            Ok(pr_ref) => return Ok(pr_ref),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        TriageError::InvalidInput("pull request has neither html_url nor diff_url".to_string())
    }))
}

/// Count files, added and removed lines in a unified diff
pub fn summarize(diff: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    // `---`/`+++` are file headers only between `diff --git` and the first hunk
    let mut in_header = true;

    for line in diff.lines() {
        if line.starts_with("diff --git") {
            stats.files += 1;
            in_header = true;
        } else if line.starts_with("@@") {
            in_header = false;
        } else if in_header && (line.starts_with("+++") || line.starts_with("---")) {
            // file headers
        } else if line.starts_with('+') {
            stats.additions += 1;
        } else if line.starts_with('-') {
            stats.deletions += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_web_urls() {
        let pr = parse_pr_url("https://github.com/user/repo/pull/123").unwrap();
        assert_eq!(pr.owner, "user");
        assert_eq!(pr.repo, "repo");
        assert_eq!(pr.number, 123);

        let pr = parse_pr_url("https://github.com/user/repo/pull/789/files").unwrap();
        assert_eq!(pr.number, 789);

        let pr = parse_pr_url("https://github.com/user/repo/pull/123/commits/abc").unwrap();
        assert_eq!(pr.number, 123);

        let pr = parse_pr_url("https://github.com/user/repo/pull/0").unwrap();
        assert_eq!(pr.number, 0);

        let pr = parse_pr_url("https://github.com/octo/demo/pull/42.diff").unwrap();
        assert_eq!(pr.to_string(), "octo/demo#42");
    }

    #[test]
    fn test_parse_api_url() {
        let pr = parse_pr_url("https://api.github.com/repos/octo/demo/pulls/1").unwrap();
        assert_eq!(pr.owner, "octo");
        assert_eq!(pr.repo, "demo");
        assert_eq!(pr.number, 1);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for url in [
            "https://github.com/user/repo/issues/123",
            "https://gitlab.com/user/repo/pull/123",
            "https://github.com/user/repo/pull/",
            "https://github.com/user/repo/pull/abc",
            "github.com/user/repo/pull/123",
            "http://github.com/user/repo/pull/123",
            "https://api.github.com/repos/user/repo/issues/1",
            "",
        ] {
            let err = parse_pr_url(url).unwrap_err();
            assert!(matches!(err, TriageError::InvalidInput(_)), "{url}");
        }
    }

    #[test]
    fn test_resolve_prefers_html_url() {
        let pr = PullRequest {
            html_url: Some("https://github.com/a/b/pull/1".to_string()),
            diff_url: Some("https://github.com/c/d/pull/2.diff".to_string()),
        };
        assert_eq!(resolve_pr_ref(&pr).unwrap().owner, "a");

        let pr = PullRequest {
            html_url: Some("not a url".to_string()),
            diff_url: Some("https://github.com/c/d/pull/2.diff".to_string()),
        };
        assert_eq!(resolve_pr_ref(&pr).unwrap().number, 2);

        assert!(resolve_pr_ref(&PullRequest::default()).is_err());
    }

    #[test]
    fn test_summarize() {
        let diff = r#"diff --git a/src/main.rs b/src/main.rs
index 1234567..abcdefg 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
+    println!("Hello");
-    println!("Bye");
     println!("World");
 }
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1 +1,2 @@
+docs
"#;

        let stats = summarize(diff);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.additions, 2);
        assert_eq!(stats.deletions, 1);
    }

    #[test]
    fn test_summarize_counts_removed_dash_lines_in_hunks() {
        let diff = "diff --git a/schema.sql b/schema.sql
--- a/schema.sql
+++ b/schema.sql
@@ -1,3 +1,2 @@
--- legacy users table
+++ counter
 CREATE TABLE users (id int);
";

        let stats = summarize(diff);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.deletions, 1);
    }
}
