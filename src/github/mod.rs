pub mod client;
pub mod diff;
pub mod retry;

pub use client::DiffFetcher;
pub use diff::{parse_pr_url, resolve_pr_ref, summarize};
pub use retry::RetryPolicy;
