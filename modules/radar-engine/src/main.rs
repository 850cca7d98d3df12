use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use radar_common::{Config, RunStatus};
use radar_engine::alert::{NoopAlerter, WebhookAlerter};
use radar_engine::fetch::JsonFeedFetcher;
use radar_engine::oracle::OpenAiOracle;
use radar_engine::traits::AlertSink;
use radar_engine::Pipeline;
use radar_store::StateStore;

#[derive(Parser)]
#[command(name = "radar", about = "Incremental industry-indicator reconciliation")]
struct Cli {
    /// Topic to reconcile (defaults to RADAR_TOPIC or the configured default)
    topic: Option<String>,

    /// Print decision history for the topic instead of running
    #[arg(long)]
    history: bool,

    /// Maximum history entries to print
    #[arg(long, default_value_t = 20)]
    limit: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.history {
        let config = Config::read_only_from_env();
        let topic = cli.topic.unwrap_or(config.default_topic);
        let store = StateStore::connect(&config.db_path).await?;
        let entries = store.list_history(Some(&topic), None, cli.limit).await?;
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let config = Config::from_env();
    config.log_redacted();
    let topic = cli.topic.unwrap_or_else(|| config.default_topic.clone());

    let store = StateStore::connect(&config.db_path).await?;
    let fetcher = JsonFeedFetcher::new(&config.feed_path);
    let client = OpenAi::new(&config.llm_api_key, &config.llm_model)
        .with_base_url(&config.llm_base_url)
        .with_temperature(config.llm_temperature)
        .with_max_retries(config.llm_max_retries)
        .with_timeout(Duration::from_secs(config.llm_timeout_secs));
    let oracle = OpenAiOracle::new(client);
    let alerts: Box<dyn AlertSink> = match &config.alert_webhook_url {
        Some(url) => Box::new(WebhookAlerter::new(url)),
        None => Box::new(NoopAlerter),
    };

    let pipeline = Pipeline::new(&store, &fetcher, &oracle, alerts.as_ref());
    let report = pipeline.run(&topic).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(topic = report.topic.as_str(), status = ?report.status, "Run finished");

    if report.status == RunStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}
