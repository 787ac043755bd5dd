//! Field matcher - assigns evidence spans to fields by keyword relevance.
//!
//! For each field (ascending field id), every unclaimed span is scored as
//! `confidence * matched_keyword_count`, with keywords compared
//! case-insensitively as substrings. The highest strictly positive score
//! wins, ties going to the earlier span, and the winning span is removed from
//! the pool. This greedy single pass relies on keyword sets being
//! field-discriminating; it is not a global optimum.

use std::collections::BTreeMap;

use tracing::debug;

use field_hints::LocalizedHints;

use crate::config::MatcherConfig;
use crate::extract::ValueExtractor;
use crate::types::{EvidenceSpan, FieldValue, Provenance, ValueSource};

/// A span chosen for a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchAssignment {
    /// Index of the span in the evidence sequence
    pub evidence_index: usize,
    /// `confidence * matched_keyword_count`
    pub score: f32,
}

/// Greedy keyword matcher.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    min_confidence: f32,
}

impl FieldMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
        }
    }

    /// Assign spans to fields. Fields with no positively scoring span are absent.
    pub fn assign(
        &self,
        evidence: &[EvidenceSpan],
        hints: &LocalizedHints,
    ) -> BTreeMap<String, MatchAssignment> {
        let lowered: Vec<String> = evidence.iter().map(|s| s.text.to_lowercase()).collect();
        let mut claimed = vec![false; evidence.len()];
        let mut assignments = BTreeMap::new();

        for field_id in hints.hint_set().field_ids() {
            let keywords: Vec<String> = hints
                .keywords(field_id)
                .iter()
                .map(|k| k.to_lowercase())
                .collect();
            if keywords.is_empty() {
                continue;
            }

            let mut best: Option<MatchAssignment> = None;
            for (index, span) in evidence.iter().enumerate() {
                if claimed[index] || !self.is_eligible(span) {
                    continue;
                }

                let hits = keywords
                    .iter()
                    .filter(|k| lowered[index].contains(k.as_str()))
                    .count();
                let score = span.confidence * hits as f32;
                if score <= 0.0 {
                    continue;
                }

                // Strictly greater: ties keep the earlier span.
                if best.map_or(true, |b| score > b.score) {
                    best = Some(MatchAssignment {
                        evidence_index: index,
                        score,
                    });
                }
            }

            match best {
                Some(assignment) => {
                    debug!(
                        field = %field_id,
                        span = assignment.evidence_index,
                        score = assignment.score,
                        "Field matched"
                    );
                    claimed[assignment.evidence_index] = true;
                    assignments.insert(field_id.to_string(), assignment);
                }
                None => debug!(field = %field_id, "No matching evidence"),
            }
        }

        assignments
    }

    /// Assign spans and turn each assignment into a `Matched` value.
    pub fn match_fields(
        &self,
        evidence: &[EvidenceSpan],
        hints: &LocalizedHints,
        extractor: &ValueExtractor,
    ) -> BTreeMap<String, FieldValue> {
        self.assign(evidence, hints)
            .into_iter()
            .map(|(field_id, assignment)| {
                let span = &evidence[assignment.evidence_index];
                let value = FieldValue {
                    field_id: field_id.clone(),
                    value: extractor.extract(&span.text, hints.locale()),
                    source: ValueSource::Matched,
                    confidence: span.confidence,
                    provenance: Provenance::Evidence {
                        index: assignment.evidence_index,
                        position: span.position.clone(),
                    },
                };
                (field_id, value)
            })
            .collect()
    }

    fn is_eligible(&self, span: &EvidenceSpan) -> bool {
        span.has_valid_confidence() && span.confidence >= self.min_confidence
    }
}

impl Default for FieldMatcher {
    fn default() -> Self {
        Self::new(&MatcherConfig::default())
    }
}
