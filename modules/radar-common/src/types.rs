use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

// --- Source credibility ---

/// Where a piece of evidence came from. Closed set; free-form strings from
/// upstream (LLM output, stored JSON) go through `parse_lenient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Official,
    Media,
    Rumor,
}

impl SourceCategory {
    /// Fixed trust weight: Official 1.0 > Media 0.7 > Rumor 0.3.
    pub fn weight(self) -> f64 {
        match self {
            SourceCategory::Official => 1.0,
            SourceCategory::Media => 0.7,
            SourceCategory::Rumor => 0.3,
        }
    }

    /// Total parse. Unknown categories coerce to Media with a warning —
    /// upstream data is allowed to be sloppy, the weight model is not.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => SourceCategory::Official,
            "media" => SourceCategory::Media,
            "rumor" => SourceCategory::Rumor,
            other => {
                warn!(category = other, "Unknown source category, treating as media");
                SourceCategory::Media
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceCategory::Official => "official",
            SourceCategory::Media => "media",
            SourceCategory::Rumor => "rumor",
        }
    }
}

impl std::fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Evidence ---

/// One unit of raw fetched information. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub title: String,
    pub body: String,
    pub source: SourceCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

/// A batch of evidence for a topic at a point in time. Either "what was
/// just fetched" or "what was last accepted"; superseded, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub topic: String,
    pub collected_at: DateTime<Utc>,
    pub items: Vec<EvidenceItem>,
}

impl Snapshot {
    pub fn new(topic: impl Into<String>, items: Vec<EvidenceItem>) -> Self {
        Self {
            topic: topic.into(),
            collected_at: Utc::now(),
            items,
        }
    }
}

// --- Change candidates ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Increased,
    Decreased,
    Changed,
}

impl ChangeStatus {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "increased" => ChangeStatus::Increased,
            "decreased" => ChangeStatus::Decreased,
            _ => ChangeStatus::Changed,
        }
    }
}

/// A proposed per-field change, produced by the extractor and consumed by
/// the arbiter. Never persisted on its own — only via the winning Decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeCandidate {
    pub field: String,
    pub old: String,
    pub new: String,
    pub status: ChangeStatus,
    pub source: SourceCategory,
    pub rationale: String,
    /// Blended heuristic confidence, always within [0.2, 0.95].
    pub confidence: f64,
}

// --- Decisions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Confirmed,
    ToBeVerified,
}

impl ResolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStatus::Confirmed => "confirmed",
            ResolutionStatus::ToBeVerified => "to_be_verified",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim() {
            "to_be_verified" => ResolutionStatus::ToBeVerified,
            _ => ResolutionStatus::Confirmed,
        }
    }
}

/// The arbitrated conclusion for one indicator field in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub field: String,
    pub final_value: String,
    pub chosen_source: SourceCategory,
    /// Non-chosen sources, highest weight first, kept for human review.
    pub pending_sources: Vec<SourceCategory>,
    pub rationale: String,
    pub status: ResolutionStatus,
}

/// Currently accepted value for one (topic, field) pair. The only entity
/// mutated across runs; the baseline for the next run's diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorState {
    pub topic: String,
    pub field: String,
    pub value: String,
    pub source: SourceCategory,
    pub rationale: String,
    pub updated_at: DateTime<Utc>,
}

/// A Decision as it sits in the append-only history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_id: Uuid,
    pub topic: String,
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
}

// --- Run reporting ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Skipped,
    Error,
}

/// Structured result of one reconciliation run, returned from the trigger
/// surface. The pipeline always produces one of these, it never panics out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub topic: String,
    pub run_id: Uuid,
    pub decisions: Vec<Decision>,
    pub raw_change_count: usize,
    pub global_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn skipped(topic: &str, run_id: Uuid, reason: &str) -> Self {
        Self {
            status: RunStatus::Skipped,
            topic: topic.to_string(),
            run_id,
            decisions: Vec::new(),
            raw_change_count: 0,
            global_summary: String::new(),
            error: Some(reason.to_string()),
        }
    }

    pub fn errored(topic: &str, run_id: Uuid, error: &str) -> Self {
        Self {
            status: RunStatus::Error,
            topic: topic.to_string(),
            run_id,
            decisions: Vec::new(),
            raw_change_count: 0,
            global_summary: String::new(),
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_strictly_ordered() {
        assert!(SourceCategory::Official.weight() > SourceCategory::Media.weight());
        assert!(SourceCategory::Media.weight() > SourceCategory::Rumor.weight());
        for cat in [
            SourceCategory::Official,
            SourceCategory::Media,
            SourceCategory::Rumor,
        ] {
            assert!(cat.weight() > 0.0 && cat.weight() <= 1.0);
        }
    }

    #[test]
    fn lenient_parse_known_categories() {
        assert_eq!(SourceCategory::parse_lenient("official"), SourceCategory::Official);
        assert_eq!(SourceCategory::parse_lenient(" Media "), SourceCategory::Media);
        assert_eq!(SourceCategory::parse_lenient("RUMOR"), SourceCategory::Rumor);
    }

    #[test]
    fn lenient_parse_defaults_to_media() {
        assert_eq!(SourceCategory::parse_lenient("blog"), SourceCategory::Media);
        assert_eq!(SourceCategory::parse_lenient(""), SourceCategory::Media);
    }

    #[test]
    fn source_category_snake_case_wire_form() {
        let json = serde_json::to_string(&SourceCategory::Official).unwrap();
        assert_eq!(json, "\"official\"");
        let back: SourceCategory = serde_json::from_str("\"rumor\"").unwrap();
        assert_eq!(back, SourceCategory::Rumor);
    }

    #[test]
    fn change_status_lenient_parse() {
        assert_eq!(ChangeStatus::parse_lenient("increased"), ChangeStatus::Increased);
        assert_eq!(ChangeStatus::parse_lenient("DECREASED"), ChangeStatus::Decreased);
        assert_eq!(ChangeStatus::parse_lenient("anything"), ChangeStatus::Changed);
    }
}
