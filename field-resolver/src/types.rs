//! Core types for field resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use field_hints::{ExpectedRange, HintError};

/// One unit of text from the recognition stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0-1.0)
    pub confidence: f32,
    /// Opaque location payload, passed through to provenance untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<serde_json::Value>,
}

impl EvidenceSpan {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            position: None,
        }
    }

    /// Builder: attach a position payload.
    pub fn with_position(mut self, position: serde_json::Value) -> Self {
        self.position = Some(position);
        self
    }

    /// Whether the confidence is a number in `[0, 1]`.
    pub fn has_valid_confidence(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }
}

/// A field's value: a number, or text when no number could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldData {
    Number(f64),
    Text(String),
}

impl FieldData {
    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldData::Number(n) => Some(*n).filter(|n| n.is_finite()),
            FieldData::Text(t) => t.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldData::Text(t) => Some(t),
            FieldData::Number(_) => None,
        }
    }
}

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Read directly from an evidence span
    Matched,
    /// Derived from other fields by a calculation group
    Calculated,
}

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Evidence span at `index` in the input sequence
    Evidence {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<serde_json::Value>,
    },
    /// Calculation group that produced the value and the fields it read
    Formula { group_id: String, inputs: Vec<String> },
}

/// A resolved field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field_id: String,
    pub value: FieldData,
    pub source: ValueSource,
    /// Confidence (0.0-1.0)
    pub confidence: f32,
    pub provenance: Provenance,
}

impl FieldValue {
    pub fn is_matched(&self) -> bool {
        self.source == ValueSource::Matched
    }

    pub fn is_calculated(&self) -> bool {
        self.source == ValueSource::Calculated
    }

    pub fn as_number(&self) -> Option<f64> {
        self.value.as_number()
    }
}

/// Category of a non-fatal problem found during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A calculation group's formula could not be used
    FormulaParseError,
    /// A calculation divided by zero
    DivisionByZero,
    /// A calculation input has no numeric value
    NonNumericOperand,
    /// A calculation overflowed
    NonFiniteResult,
    /// A value fell outside the field's acceptable range and was dropped
    OutOfRange,
    /// A caller range override was unusable and ignored
    InvalidRangeOverride,
    /// An evidence span was unusable and ignored
    InvalidEvidence,
}

/// A non-fatal problem, reported alongside the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field_id: None,
            group_id: None,
            message: message.into(),
        }
    }

    /// Builder: attach the field concerned.
    pub fn for_field(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = Some(field_id.into());
        self
    }

    /// Builder: attach the calculation group concerned.
    pub fn for_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// Caller-supplied ranges that replace hint ranges for one call.
pub type RangeOverrides = BTreeMap<String, ExpectedRange>;

/// Output of one resolution call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub model_name: String,
    pub locale: String,
    /// Digest of the hint document used
    pub hint_digest: String,
    /// Resolved values by field id
    pub values: BTreeMap<String, FieldValue>,
    /// Hint fields with no value, ascending
    pub unresolved: Vec<String>,
    /// Non-fatal problems, in the order they were found
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolutionResult {
    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.values.get(field_id)
    }

    pub fn number(&self, field_id: &str) -> Option<f64> {
        self.values.get(field_id).and_then(FieldValue::as_number)
    }

    pub fn is_resolved(&self, field_id: &str) -> bool {
        self.values.contains_key(field_id)
    }

    /// Diagnostics of one kind.
    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}

/// Error types for resolution. Only hint loading can fail a call.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Hints for the model could not be loaded
    #[error(transparent)]
    Hints(#[from] HintError),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_data_numeric_view() {
        assert_eq!(FieldData::Number(2.5).as_number(), Some(2.5));
        assert_eq!(FieldData::Text(" 42 ".to_string()).as_number(), Some(42.0));
        assert_eq!(FieldData::Text("Shell".to_string()).as_number(), None);
        assert_eq!(FieldData::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn test_evidence_confidence_bounds() {
        assert!(EvidenceSpan::new("a", 0.0).has_valid_confidence());
        assert!(EvidenceSpan::new("a", 1.0).has_valid_confidence());
        assert!(!EvidenceSpan::new("a", 1.2).has_valid_confidence());
        assert!(!EvidenceSpan::new("a", f32::NAN).has_valid_confidence());
    }

    #[test]
    fn test_evidence_deserializes_without_position() {
        let span: EvidenceSpan =
            serde_json::from_str(r#"{ "text": "5.5 gal", "confidence": 0.9 }"#).unwrap();
        assert_eq!(span, EvidenceSpan::new("5.5 gal", 0.9));

        let span: EvidenceSpan = serde_json::from_str(
            r#"{ "text": "x", "confidence": 0.5, "position": { "x": 1, "y": 2 } }"#,
        )
        .unwrap();
        assert!(span.position.is_some());
    }

    #[test]
    fn test_value_serialization_shape() {
        let value = FieldValue {
            field_id: "total".to_string(),
            value: FieldData::Number(18.1),
            source: ValueSource::Matched,
            confidence: 0.9,
            provenance: Provenance::Evidence {
                index: 2,
                position: None,
            },
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["value"], serde_json::json!(18.1));
        assert_eq!(json["source"], "matched");
        assert_eq!(json["provenance"]["kind"], "evidence");
        assert_eq!(json["provenance"]["index"], 2);
    }
}
