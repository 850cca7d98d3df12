// Trait abstractions for the pipeline's external collaborators.
//
// NewsFetcher — the scraping layer. ChangeOracle — the LLM that proposes
// semantic diffs and summaries. AlertSink — failure notification delivery.
//
// These enable deterministic testing with in-process mocks: no network,
// no API keys, no live database beyond in-memory SQLite.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use radar_common::{Decision, EvidenceItem};

#[async_trait]
pub trait NewsFetcher: Send + Sync {
    /// Fetch the latest evidence items for a topic. An error or an empty
    /// result aborts the run before any state mutation.
    async fn fetch(&self, topic: &str) -> Result<Vec<EvidenceItem>>;
}

#[async_trait]
pub trait ChangeOracle: Send + Sync {
    /// Compare prior indicator text against new evidence text. Returns
    /// free-form text expected to contain a JSON array of change
    /// candidates; callers treat the output as untrusted and lossy.
    async fn propose_changes(&self, prior_text: &str, evidence_text: &str) -> Result<String>;

    /// Short human-readable summary of a run's decisions. Failures here
    /// are non-fatal; the pipeline falls back to a templated summary.
    async fn summarize(&self, topic: &str, decisions: &[Decision]) -> Result<String>;
}

/// Structured context sent to the alert channel when a run aborts.
#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub topic: String,
    pub run_id: Uuid,
    pub error: String,
    pub error_kind: String,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Best-effort delivery. Implementations log their own failures and
    /// never propagate them back into the pipeline.
    async fn notify(&self, context: &FailureContext);
}
