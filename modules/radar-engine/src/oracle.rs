//! LLM-backed implementation of the `ChangeOracle` collaborator.

use anyhow::Result;
use async_trait::async_trait;

use ai_client::OpenAi;
use radar_common::Decision;

use crate::traits::ChangeOracle;

const CHANGE_SYSTEM_PROMPT: &str = r#"You are an industry analysis assistant.

Compare the KNOWN INDICATORS against the NEW EVIDENCE and identify every key indicator whose value changed. Align indicators semantically — the same metric may appear under different names.

For each change, add an `insight` field: one plain-language sentence explaining what the change means for the industry (the logic behind it, not a restatement of the numbers).

Output ONLY a JSON array in this shape:

[
  {
    "field": "capacity utilization",
    "old": "80%",
    "new": "92%",
    "status": "increased",
    "insight": "Demand is surging and leading fabs are running near full load.",
    "confidence": 0.8
  }
]

`status` is one of "increased", "decreased" or "changed". `confidence` is your certainty in [0, 1] that the change is real; omit it if you cannot judge. If nothing changed, output []."#;

const SUMMARY_SYSTEM_PROMPT: &str = "You are an industry analysis assistant. \
Given the arbitrated indicator decisions from today's reconciliation run, \
write a short overall conclusion (2-3 sentences) for a human reader. \
Mention the most consequential change first. Plain text only.";

pub struct OpenAiOracle {
    client: OpenAi,
}

impl OpenAiOracle {
    pub fn new(client: OpenAi) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChangeOracle for OpenAiOracle {
    async fn propose_changes(&self, prior_text: &str, evidence_text: &str) -> Result<String> {
        let user = format!(
            "KNOWN INDICATORS (last accepted state):\n{prior_text}\n\n\
             NEW EVIDENCE (just collected):\n{evidence_text}\n\n\
             Identify the differences and output the JSON array:"
        );
        self.client.chat_completion(CHANGE_SYSTEM_PROMPT, user).await
    }

    async fn summarize(&self, topic: &str, decisions: &[Decision]) -> Result<String> {
        let lines: Vec<String> = decisions
            .iter()
            .map(|d| {
                format!(
                    "- {} = {} (source: {}, {}): {}",
                    d.field,
                    d.final_value,
                    d.chosen_source,
                    d.status.as_str(),
                    d.rationale
                )
            })
            .collect();
        let user = format!(
            "Topic: {topic}\n\nToday's arbitrated indicator decisions:\n{}",
            lines.join("\n")
        );
        self.client.chat_completion(SUMMARY_SYSTEM_PROMPT, user).await
    }
}
