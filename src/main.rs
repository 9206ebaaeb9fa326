use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pr_triage::{
    run_server, ChannelRouter, Config, DiffFetcher, GeminiClassifier, Orchestrator, Secrets,
    ServerState, SlackNotifier,
};

#[derive(Parser)]
#[command(name = "pr-triage")]
#[command(about = "Triage GitHub pull requests with AI and route Slack notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, default_value = ".pr-triage/config.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long, env = "PR_TRIAGE_BIND")]
        bind: Option<String>,
    },

    /// Fetch and classify a single PR without sending notifications
    Analyze {
        /// Pull request URL (https://github.com/owner/repo/pull/N)
        #[arg(long)]
        pr_url: String,

        /// Print the first lines of the fetched diff
        #[arg(long)]
        show_diff: bool,
    },

    /// Show which integrations are configured
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pr_triage=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let secrets = Secrets::from_env();

    let orchestrator = build_orchestrator(&config, &secrets)?;

    match cli.command {
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = Arc::new(ServerState::new(orchestrator));
            let status = state.integration_status();
            info!(
                github = %status.github,
                classifier = %status.classifier,
                slack = %status.slack,
                "Integration status"
            );
            run_server(state, &addr).await?;
        }
        Commands::Analyze { pr_url, show_diff } => {
            analyze(orchestrator, &pr_url, show_diff).await?;
        }
        Commands::Status => {
            let status = ServerState::new(orchestrator).integration_status();
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn build_orchestrator(config: &Config, secrets: &Secrets) -> Result<Orchestrator> {
    let fetcher = DiffFetcher::new(&config.github, secrets.github_token.clone())?;
    let classifier = GeminiClassifier::new(&config.classifier, secrets.gemini_api_key.clone())?;
    let notifier = SlackNotifier::new(&config.slack, secrets.slack_bot_token.clone())?;
    let router = ChannelRouter::new(config.slack.channels.clone());

    Ok(
        Orchestrator::new(fetcher, Arc::new(classifier), Arc::new(notifier), router)
            .with_fallback_verdict(config.classifier.fallback_verdict)
            .with_max_event_bytes(config.server.max_event_bytes),
    )
}

async fn analyze(orchestrator: Orchestrator, pr_url: &str, show_diff: bool) -> Result<()> {
    let (diff, assessment) = orchestrator
        .analyze(pr_url)
        .await
        .with_context(|| format!("Failed to analyze {}", pr_url))?;

    println!("PR:         {}", diff.pr);
    println!(
        "Diff:       {} files, +{} -{} ({:?}, {} primary attempts)",
        diff.stats.files,
        diff.stats.additions,
        diff.stats.deletions,
        diff.provenance,
        diff.primary_attempts
    );
    println!("Verdict:    {}", assessment.verdict);
    println!("Comment:    {}", assessment.comment);

    if show_diff {
        println!();
        for (i, line) in diff.text.lines().take(40).enumerate() {
            println!("{:2}: {}", i + 1, line);
        }
    }

    Ok(())
}
