//! Change extraction: turn the last accepted snapshot plus a batch of new
//! evidence into per-field change candidates with a blended confidence
//! score. The semantic diffing itself is delegated to the oracle; this
//! module owns the defensive parsing of its output and the local
//! confidence heuristics.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use ai_client::{extract_json_array, strip_code_blocks, strip_trailing_commas, truncate_to_char_boundary};
use radar_common::{ChangeCandidate, ChangeStatus, EvidenceItem, Snapshot, SourceCategory};

use crate::traits::ChangeOracle;

/// Byte budget for each prompt section, to stay clear of token limits.
const PROMPT_SECTION_MAX_BYTES: usize = 12_000;

/// Confidence is never reported as certain or worthless — this is an
/// automated heuristic, not ground truth.
const CONFIDENCE_FLOOR: f64 = 0.20;
const CONFIDENCE_CEILING: f64 = 0.95;

/// What the oracle returns for each proposed change. Every field defaults
/// so that sloppy output degrades instead of failing the whole array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub old: String,
    #[serde(default)]
    pub new: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub insight: String,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<f64>,
}

/// Accept a number, a numeric string, or garbage (treated as absent).
fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }))
}

/// Parse the oracle's free-form answer into raw changes.
///
/// In order: (1) strip code fences and try a strict parse, (2) extract the
/// first top-level array literal and retry with trailing commas removed,
/// (3) give up and return an empty list. A garbled answer degrades to
/// "no changes detected", it never crashes the pipeline.
pub fn parse_raw_changes(text: &str) -> Vec<RawChange> {
    let cleaned = strip_code_blocks(text);

    if let Ok(changes) = serde_json::from_str::<Vec<RawChange>>(cleaned) {
        return changes;
    }

    if let Some(array) = extract_json_array(cleaned) {
        let repaired = strip_trailing_commas(array);
        if let Ok(changes) = serde_json::from_str::<Vec<RawChange>>(&repaired) {
            return changes;
        }
    }

    warn!(
        preview = truncate_to_char_boundary(text, 200),
        "Unparseable oracle output, treating as no changes"
    );
    Vec::new()
}

/// Corroboration signals computed over the whole evidence batch.
#[derive(Debug, Clone, Copy)]
struct BatchSignals {
    dominant_weight: f64,
    distinct_sources: usize,
    item_count: usize,
    documented_count: usize,
}

impl BatchSignals {
    fn from_items(items: &[EvidenceItem]) -> Self {
        let distinct: HashSet<SourceCategory> = items.iter().map(|i| i.source).collect();
        let documented = items
            .iter()
            .filter(|i| i.url.is_some() || i.published_at.is_some())
            .count();
        Self {
            dominant_weight: items[0].source.weight(),
            distinct_sources: distinct.len(),
            item_count: items.len(),
            documented_count: documented,
        }
    }

    /// Local confidence: source weight 45%, source distinctness 30%,
    /// corroborating volume 15%, evidence completeness 10%.
    fn local_confidence(&self) -> f64 {
        let distinctness = (self.distinct_sources as f64 / 3.0).min(1.0);
        let volume = (self.item_count as f64 / 3.0).min(1.0);
        let completeness = self.documented_count as f64 / (2 * self.item_count) as f64;
        0.45 * self.dominant_weight + 0.30 * distinctness + 0.15 * volume + 0.10 * completeness
    }
}

/// Blend an optional oracle-supplied confidence with the locally computed
/// one, clamped into [0.2, 0.95].
fn blend_confidence(external: Option<f64>, local: f64) -> f64 {
    let blended = match external {
        Some(e) => 0.6 * e.clamp(0.0, 1.0) + 0.4 * local,
        None => local,
    };
    blended.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

pub struct ChangeExtractor<'a> {
    oracle: &'a dyn ChangeOracle,
}

impl<'a> ChangeExtractor<'a> {
    pub fn new(oracle: &'a dyn ChangeOracle) -> Self {
        Self { oracle }
    }

    /// Extract change candidates from a batch of new items against the last
    /// accepted snapshot. Empty input is a no-op; a missing prior snapshot
    /// (first run) still consults the oracle with a sentinel context so
    /// baseline candidates can be created.
    pub async fn extract(
        &self,
        prior: Option<&Snapshot>,
        new_items: &[EvidenceItem],
    ) -> Vec<ChangeCandidate> {
        if new_items.is_empty() {
            return Vec::new();
        }

        let prior_text = match prior {
            Some(snapshot) => render_items(&snapshot.items),
            None => "No prior indicators recorded.".to_string(),
        };
        let evidence_text = render_items(new_items);

        let answer = match self
            .oracle
            .propose_changes(
                truncate_to_char_boundary(&prior_text, PROMPT_SECTION_MAX_BYTES),
                truncate_to_char_boundary(&evidence_text, PROMPT_SECTION_MAX_BYTES),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Oracle call failed, degrading to no changes");
                return Vec::new();
            }
        };

        let raw = parse_raw_changes(&answer);
        let signals = BatchSignals::from_items(new_items);
        let local = signals.local_confidence();

        // The oracle compares pooled text and does not attribute per-candidate
        // provenance, so every candidate carries the batch's dominant source.
        let dominant = new_items[0].source;

        raw.into_iter()
            .filter_map(|change| {
                if change.field.trim().is_empty() {
                    warn!("Dropping oracle change with empty field name");
                    return None;
                }
                Some(ChangeCandidate {
                    field: change.field,
                    old: change.old,
                    new: change.new,
                    status: ChangeStatus::parse_lenient(&change.status),
                    source: dominant,
                    rationale: change.insight,
                    confidence: blend_confidence(change.confidence, local),
                })
            })
            .collect()
    }
}

fn render_items(items: &[EvidenceItem]) -> String {
    items
        .iter()
        .map(|item| {
            let mut line = format!("[{}] {}: {}", item.source, item.title, item.body);
            if let Some(date) = &item.published_at {
                line.push_str(&format!(" ({date})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use radar_common::Decision;

    struct CannedOracle {
        reply: std::result::Result<String, String>,
    }

    #[async_trait]
    impl ChangeOracle for CannedOracle {
        async fn propose_changes(&self, _prior: &str, _evidence: &str) -> Result<String> {
            self.reply.clone().map_err(|e| anyhow!(e))
        }

        async fn summarize(&self, _topic: &str, _decisions: &[Decision]) -> Result<String> {
            Ok(String::new())
        }
    }

    fn item(source: SourceCategory, url: Option<&str>, date: Option<&str>) -> EvidenceItem {
        EvidenceItem {
            title: "headline".to_string(),
            body: "body".to_string(),
            source,
            url: url.map(str::to_string),
            published_at: date.map(str::to_string),
        }
    }

    // --- parsing ---

    #[test]
    fn parses_plain_json_array() {
        let raw = parse_raw_changes(r#"[{"field": "增长率", "old": "5%", "new": "2%", "status": "decreased"}]"#);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].field, "增长率");
        assert_eq!(raw[0].confidence, None);
    }

    #[test]
    fn parses_code_fenced_json() {
        let fenced = "```json\n[{\"field\": \"x\", \"old\": \"1\", \"new\": \"2\", \"status\": \"increased\"}]\n```";
        let direct = "[{\"field\": \"x\", \"old\": \"1\", \"new\": \"2\", \"status\": \"increased\"}]";
        let from_fenced = parse_raw_changes(fenced);
        let from_direct = parse_raw_changes(direct);
        assert_eq!(
            serde_json::to_value(&from_fenced).unwrap(),
            serde_json::to_value(&from_direct).unwrap()
        );
    }

    #[test]
    fn repairs_trailing_comma_inside_array() {
        let raw = parse_raw_changes("Sure, here you go:\n[{\"field\": \"x\", \"new\": \"2\",},]\nHope that helps!");
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].field, "x");
    }

    #[test]
    fn garbage_degrades_to_empty() {
        assert!(parse_raw_changes("I could not find any JSON to give you").is_empty());
        assert!(parse_raw_changes("[{not json at all").is_empty());
        assert!(parse_raw_changes("").is_empty());
    }

    #[test]
    fn confidence_accepts_numbers_and_numeric_strings() {
        let raw = parse_raw_changes(
            r#"[{"field": "a", "confidence": 0.8}, {"field": "b", "confidence": "0.5"}, {"field": "c", "confidence": "high"}]"#,
        );
        assert_eq!(raw[0].confidence, Some(0.8));
        assert_eq!(raw[1].confidence, Some(0.5));
        assert_eq!(raw[2].confidence, None);
    }

    // --- confidence blending ---

    #[test]
    fn confidence_always_within_bounds() {
        for weight in [0.3, 0.7, 1.0] {
            for distinct in 1..=3usize {
                for count in 1..=5usize {
                    for documented in 0..=count {
                        let signals = BatchSignals {
                            dominant_weight: weight,
                            distinct_sources: distinct,
                            item_count: count,
                            documented_count: documented,
                        };
                        for external in [None, Some(0.0), Some(0.5), Some(1.0), Some(5.0)] {
                            let c = blend_confidence(external, signals.local_confidence());
                            assert!((CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&c));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn external_confidence_dominates_blend() {
        let local = 0.5;
        assert!((blend_confidence(Some(1.0), local) - 0.8).abs() < 1e-9);
        assert!((blend_confidence(None, local) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn low_signals_hit_the_floor() {
        // Lone undocumented rumor with a zero external opinion.
        let signals = BatchSignals {
            dominant_weight: 0.3,
            distinct_sources: 1,
            item_count: 1,
            documented_count: 0,
        };
        let c = blend_confidence(Some(0.0), signals.local_confidence());
        assert!(c >= CONFIDENCE_FLOOR);
    }

    #[test]
    fn local_confidence_weights_sum_as_specified() {
        // Best reachable signals: official source, 3 distinct sources,
        // 3 items, every item documented. Completeness caps at 0.5
        // (documented / 2·items), so the local maximum is
        // 0.45 + 0.30 + 0.15 + 0.05 = 0.95.
        let signals = BatchSignals {
            dominant_weight: 1.0,
            distinct_sources: 3,
            item_count: 3,
            documented_count: 3,
        };
        assert!((signals.local_confidence() - 0.95).abs() < 1e-9);
    }

    // --- extraction ---

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let oracle = CannedOracle {
            reply: Ok("[]".to_string()),
        };
        let extractor = ChangeExtractor::new(&oracle);
        let out = extractor.extract(None, &[]).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn first_run_still_produces_baseline_candidates() {
        let oracle = CannedOracle {
            reply: Ok(r#"[{"field": "产能利用率", "old": "", "new": "80%", "status": "changed", "insight": "baseline"}]"#.to_string()),
        };
        let extractor = ChangeExtractor::new(&oracle);
        let items = vec![item(SourceCategory::Official, Some("https://x"), None)];
        let out = extractor.extract(None, &items).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field, "产能利用率");
        assert_eq!(out[0].source, SourceCategory::Official);
    }

    #[tokio::test]
    async fn oracle_failure_degrades_to_no_changes() {
        let oracle = CannedOracle {
            reply: Err("timed out".to_string()),
        };
        let extractor = ChangeExtractor::new(&oracle);
        let items = vec![item(SourceCategory::Media, None, None)];
        assert!(extractor.extract(None, &items).await.is_empty());
    }

    #[tokio::test]
    async fn candidates_are_stamped_with_dominant_source() {
        let oracle = CannedOracle {
            reply: Ok(r#"[{"field": "x", "old": "1", "new": "2", "status": "increased"}]"#.to_string()),
        };
        let extractor = ChangeExtractor::new(&oracle);
        let items = vec![
            item(SourceCategory::Rumor, None, Some("2026-08-29")),
            item(SourceCategory::Official, Some("https://x"), None),
        ];
        let out = extractor.extract(None, &items).await;
        assert_eq!(out[0].source, SourceCategory::Rumor);
        assert!(out[0].confidence >= CONFIDENCE_FLOOR && out[0].confidence <= CONFIDENCE_CEILING);
    }
}
