//! Conflict arbitration: collapse change candidates per indicator field
//! into one authoritative decision by source weight, retaining the losing
//! sources for human review.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use radar_common::{ChangeCandidate, Decision, ResolutionStatus};

const FALLBACK_RATIONALE: &str = "indicator changed";
const PENDING_PREFIX: &str = "Pending verification: ";

/// One decision per distinct field, in first-seen field order. Within a
/// field, candidates are sorted by source weight descending; the stable
/// sort keeps original relative order as the deterministic tie-break.
pub fn resolve(candidates: &[ChangeCandidate]) -> Vec<Decision> {
    let mut field_order: Vec<&str> = Vec::new();
    let mut grouped: HashMap<&str, Vec<&ChangeCandidate>> = HashMap::new();
    for candidate in candidates {
        let field = candidate.field.as_str();
        match grouped.entry(field) {
            Entry::Occupied(mut entry) => entry.get_mut().push(candidate),
            Entry::Vacant(entry) => {
                field_order.push(field);
                entry.insert(vec![candidate]);
            }
        }
    }

    field_order
        .into_iter()
        .map(|field| {
            let mut group = grouped.remove(field).unwrap_or_default();
            group.sort_by(|a, b| {
                b.source
                    .weight()
                    .partial_cmp(&a.source.weight())
                    .unwrap_or(Ordering::Equal)
            });

            let winner = group[0];
            let pending: Vec<_> = group[1..].iter().map(|c| c.source).collect();

            // A genuine tie at the top means sources of equal credibility
            // disagree; flag the decision for a human reviewer.
            let tied = group[1..]
                .iter()
                .any(|c| c.source.weight() == winner.source.weight());
            let status = if tied {
                ResolutionStatus::ToBeVerified
            } else {
                ResolutionStatus::Confirmed
            };

            let base = if winner.rationale.trim().is_empty() {
                FALLBACK_RATIONALE.to_string()
            } else {
                winner.rationale.clone()
            };
            let rationale = if tied {
                format!("{PENDING_PREFIX}{base}")
            } else {
                base
            };

            Decision {
                field: field.to_string(),
                final_value: winner.new.clone(),
                chosen_source: winner.source,
                pending_sources: pending,
                rationale,
                status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_common::{ChangeStatus, SourceCategory};

    fn candidate(field: &str, new: &str, source: SourceCategory) -> ChangeCandidate {
        ChangeCandidate {
            field: field.to_string(),
            old: "80%".to_string(),
            new: new.to_string(),
            status: ChangeStatus::Changed,
            source,
            rationale: String::new(),
            confidence: 0.5,
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(resolve(&[]).is_empty());
    }

    #[test]
    fn highest_weight_source_wins() {
        let decisions = resolve(&[
            candidate("产能利用率", "92%", SourceCategory::Official),
            candidate("产能利用率", "90%", SourceCategory::Media),
            candidate("产能利用率", "85%", SourceCategory::Rumor),
        ]);
        assert_eq!(decisions.len(), 1);
        let d = &decisions[0];
        assert_eq!(d.final_value, "92%");
        assert_eq!(d.chosen_source, SourceCategory::Official);
        assert_eq!(
            d.pending_sources,
            vec![SourceCategory::Media, SourceCategory::Rumor]
        );
        assert_eq!(d.status, ResolutionStatus::Confirmed);
    }

    #[test]
    fn winner_order_is_independent_of_input_order() {
        let decisions = resolve(&[
            candidate("x", "85%", SourceCategory::Rumor),
            candidate("x", "90%", SourceCategory::Media),
            candidate("x", "92%", SourceCategory::Official),
        ]);
        assert_eq!(decisions[0].final_value, "92%");
        assert_eq!(
            decisions[0].pending_sources,
            vec![SourceCategory::Media, SourceCategory::Rumor]
        );
    }

    #[test]
    fn chosen_weight_dominates_every_pending_source() {
        let inputs = vec![
            candidate("a", "1", SourceCategory::Media),
            candidate("a", "2", SourceCategory::Official),
            candidate("b", "3", SourceCategory::Rumor),
            candidate("b", "4", SourceCategory::Rumor),
            candidate("c", "5", SourceCategory::Media),
        ];
        for decision in resolve(&inputs) {
            for pending in &decision.pending_sources {
                assert!(decision.chosen_source.weight() >= pending.weight());
            }
        }
    }

    #[test]
    fn top_weight_tie_is_flagged_for_verification() {
        let decisions = resolve(&[
            candidate("X", "91%", SourceCategory::Media),
            candidate("X", "93%", SourceCategory::Media),
            candidate("X", "85%", SourceCategory::Rumor),
        ]);
        let d = &decisions[0];
        assert_eq!(d.status, ResolutionStatus::ToBeVerified);
        // Stable sort: the first Media candidate wins the tie.
        assert_eq!(d.final_value, "91%");
        assert_eq!(
            d.pending_sources,
            vec![SourceCategory::Media, SourceCategory::Rumor]
        );
        assert!(d.rationale.starts_with(PENDING_PREFIX));
    }

    #[test]
    fn lone_rumor_is_still_confirmed() {
        let decisions = resolve(&[candidate("x", "85%", SourceCategory::Rumor)]);
        let d = &decisions[0];
        assert_eq!(d.status, ResolutionStatus::Confirmed);
        assert_eq!(d.chosen_source, SourceCategory::Rumor);
        assert!(d.pending_sources.is_empty());
    }

    #[test]
    fn fields_keep_first_seen_order() {
        let decisions = resolve(&[
            candidate("beta", "1", SourceCategory::Media),
            candidate("alpha", "2", SourceCategory::Media),
            candidate("beta", "3", SourceCategory::Official),
        ]);
        let fields: Vec<_> = decisions.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["beta", "alpha"]);
    }

    #[test]
    fn winner_insight_becomes_rationale() {
        let mut with_insight = candidate("x", "92%", SourceCategory::Official);
        with_insight.rationale = "top fabs near full load".to_string();
        let decisions = resolve(&[with_insight, candidate("x", "90%", SourceCategory::Media)]);
        assert_eq!(decisions[0].rationale, "top fabs near full load");

        let decisions = resolve(&[candidate("y", "1", SourceCategory::Media)]);
        assert_eq!(decisions[0].rationale, FALLBACK_RATIONALE);
    }
}
