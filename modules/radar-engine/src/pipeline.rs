//! The sequential reconciliation run: fetch → extract → arbitrate → commit.
//!
//! Only the fetch and commit stages may short-circuit the whole run; the
//! oracle stages degrade. The accepted state is advanced exclusively by
//! `StateStore::commit_run`, and never when the fetch produced no items.

use tracing::{info, warn};
use uuid::Uuid;

use radar_common::{Decision, RadarError, RunReport, RunStatus, Snapshot};
use radar_store::{StateStore, StoreError};

use crate::arbiter;
use crate::extract::ChangeExtractor;
use crate::traits::{AlertSink, ChangeOracle, FailureContext, NewsFetcher};

pub struct Pipeline<'a> {
    store: &'a StateStore,
    fetcher: &'a dyn NewsFetcher,
    oracle: &'a dyn ChangeOracle,
    alerts: &'a dyn AlertSink,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a StateStore,
        fetcher: &'a dyn NewsFetcher,
        oracle: &'a dyn ChangeOracle,
        alerts: &'a dyn AlertSink,
    ) -> Self {
        Self {
            store,
            fetcher,
            oracle,
            alerts,
        }
    }

    /// Run one reconciliation for a topic. Always returns a structured
    /// report; never panics out of the entry point.
    pub async fn run(&self, topic: &str) -> RunReport {
        let run_id = Uuid::new_v4();
        info!(topic, run_id = %run_id, "Reconciliation run starting");

        match self.store.acquire_run_lock(topic, run_id).await {
            Ok(()) => {}
            Err(StoreError::LockConflict(_)) => {
                info!(topic, "Another run holds the topic lock, skipping");
                return RunReport::skipped(topic, run_id, "run lock held");
            }
            Err(e) => {
                let err = RadarError::Store(e.to_string());
                self.alert(topic, run_id, &err).await;
                return RunReport::errored(topic, run_id, &err.to_string());
            }
        }

        let report = self.run_locked(topic, run_id).await;

        if let Err(e) = self.store.release_run_lock(topic).await {
            warn!(topic, error = %e, "Failed to release run lock");
        }
        report
    }

    async fn run_locked(&self, topic: &str, run_id: Uuid) -> RunReport {
        // Stage 1: fetch. Failure or an empty batch aborts before any
        // state mutation — empty data must never wipe the accepted state.
        let items = match self.fetcher.fetch(topic).await {
            Ok(items) => items,
            Err(e) => {
                let err = RadarError::Fetch(e.to_string());
                self.alert(topic, run_id, &err).await;
                return RunReport::errored(topic, run_id, &err.to_string());
            }
        };
        if items.is_empty() {
            let err = RadarError::EmptyFetch;
            self.alert(topic, run_id, &err).await;
            return RunReport::skipped(topic, run_id, &err.to_string());
        }

        let snapshot = Snapshot::new(topic, items);

        // Stage 2: archive the raw fetch. Diagnostic only; a failed write
        // is logged and the run continues.
        if let Err(e) = self.store.save_raw_fetch(&snapshot).await {
            warn!(topic, error = %e, "Failed to save raw fetch record");
        }

        // Stage 3: load the baseline.
        let prior = match self.store.load_accepted_state(topic).await {
            Ok(prior) => prior,
            Err(e) => {
                let err = RadarError::Store(e.to_string());
                self.alert(topic, run_id, &err).await;
                return RunReport::errored(topic, run_id, &err.to_string());
            }
        };
        if prior.is_none() {
            info!(topic, "No accepted state yet, extracting baseline indicators");
        }

        // Stages 4-5: extract and arbitrate. Both are total — a garbled
        // oracle answer degrades to an empty change set.
        let extractor = ChangeExtractor::new(self.oracle);
        let candidates = extractor.extract(prior.as_ref(), &snapshot.items).await;
        let raw_change_count = candidates.len();
        let decisions = arbiter::resolve(&candidates);
        info!(
            topic,
            candidates = raw_change_count,
            decisions = decisions.len(),
            "Arbitration complete"
        );

        // Stage 6: global summary, templated on oracle failure.
        let global_summary = match self.oracle.summarize(topic, &decisions).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback_summary(topic, &decisions),
            Err(e) => {
                warn!(topic, error = %e, "Summary generation failed, using template");
                fallback_summary(topic, &decisions)
            }
        };

        // Stage 7: the only state-advancing step. All-or-nothing.
        if let Err(e) = self.store.commit_run(run_id, &snapshot, &decisions).await {
            let err = RadarError::Store(e.to_string());
            self.alert(topic, run_id, &err).await;
            return RunReport::errored(topic, run_id, &err.to_string());
        }

        info!(topic, run_id = %run_id, "Reconciliation run committed");
        RunReport {
            status: RunStatus::Success,
            topic: topic.to_string(),
            run_id,
            decisions,
            raw_change_count,
            global_summary,
            error: None,
        }
    }

    async fn alert(&self, topic: &str, run_id: Uuid, error: &RadarError) {
        warn!(topic, run_id = %run_id, kind = error.kind(), error = %error, "Run aborted");
        self.alerts
            .notify(&FailureContext {
                topic: topic.to_string(),
                run_id,
                error: error.to_string(),
                error_kind: error.kind().to_string(),
            })
            .await;
    }
}

fn fallback_summary(topic: &str, decisions: &[Decision]) -> String {
    if decisions.is_empty() {
        return format!("No indicator changes detected for {topic} in this run.");
    }
    let parts: Vec<String> = decisions
        .iter()
        .map(|d| format!("{} = {} ({})", d.field, d.final_value, d.chosen_source))
        .collect();
    format!(
        "{} indicator(s) updated for {topic}: {}",
        decisions.len(),
        parts.join("; ")
    )
}
