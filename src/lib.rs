pub mod adapters;
pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod router;
pub mod server;

pub use adapters::{classify_guarded, classify_with_fallback, Classification, Classifier, GeminiClassifier};
pub use config::{Config, Secrets};
pub use error::{TriageError, TriageResult};
pub use github::{DiffFetcher, RetryPolicy};
pub use models::*;
pub use notifications::{DeliveryReceipt, Notifier, SlackNotifier};
pub use orchestrator::{
    acknowledge, dispatch, Acknowledgment, Orchestrator, PipelineOutcome, Stage,
};
pub use router::ChannelRouter;
pub use server::{build_router, run_server, ServerState};
