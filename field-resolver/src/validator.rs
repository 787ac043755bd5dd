//! Range validator - drops numeric values outside a field's acceptable range.
//!
//! The effective range for a field is the caller's override when one is
//! given and usable, else the hint document's `expectedRange`. Overrides
//! apply to one call only and never touch the cached hints.

use std::collections::BTreeMap;

use tracing::debug;

use field_hints::{ExpectedRange, HintSet};

use crate::types::{Diagnostic, DiagnosticKind, FieldValue, RangeOverrides};

/// Effective ranges for one resolution call.
#[derive(Debug, Clone, Default)]
pub struct RangeValidator {
    ranges: BTreeMap<String, ExpectedRange>,
}

impl RangeValidator {
    /// Build the effective range table from hint ranges and caller overrides.
    ///
    /// Unusable overrides are reported and ignored; overrides for fields the
    /// hint set does not define have nothing to apply to and are skipped.
    pub fn new(hints: &HintSet, overrides: &RangeOverrides, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let mut ranges: BTreeMap<String, ExpectedRange> = hints
            .fields()
            .filter_map(|hint| hint.expected_range.map(|r| (hint.field_id.clone(), r)))
            .collect();

        for (field_id, range) in overrides {
            if !hints.contains(field_id) {
                debug!(field = %field_id, "Range override for unknown field ignored");
                continue;
            }
            if !range.is_valid() {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::InvalidRangeOverride,
                        format!(
                            "override {}..{} is not a finite range with min <= max",
                            range.min, range.max
                        ),
                    )
                    .for_field(field_id.clone()),
                );
                continue;
            }
            ranges.insert(field_id.clone(), *range);
        }

        Self { ranges }
    }

    /// Effective range for `field_id`.
    pub fn range_for(&self, field_id: &str) -> Option<&ExpectedRange> {
        self.ranges.get(field_id)
    }

    /// Whether `value` is acceptable for `field_id`. Fields without a range accept anything.
    pub fn accepts(&self, field_id: &str, value: f64) -> bool {
        self.range_for(field_id).map_or(true, |r| r.contains(value))
    }

    /// Remove matched numeric values that fall outside their field's range.
    ///
    /// Non-numeric values, calculated values and fields without a range pass
    /// through unchanged.
    pub fn validate(
        &self,
        values: BTreeMap<String, FieldValue>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> BTreeMap<String, FieldValue> {
        values
            .into_iter()
            .filter(|(field_id, value)| {
                if !value.is_matched() {
                    return true;
                }
                let (Some(number), Some(range)) = (value.as_number(), self.range_for(field_id)) else {
                    return true;
                };
                if range.contains(number) {
                    return true;
                }

                debug!(field = %field_id, value = number, min = range.min, max = range.max, "Matched value out of range");
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::OutOfRange,
                        format!("matched value {} outside {}..{}", number, range.min, range.max),
                    )
                    .for_field(field_id.clone()),
                );
                false
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_hints::{parse_document, DocumentFormat, RawHintDocument};

    use crate::types::{FieldData, Provenance, ValueSource};

    fn hint_set() -> HintSet {
        let doc = RawHintDocument {
            origin: "test".to_string(),
            format: DocumentFormat::Json,
            body: r#"{
                "gallons": { "expectedRange": { "min": 1, "max": 40 } },
                "station": {},
                "total": {}
            }"#
            .to_string(),
        };
        parse_document("fuel", &doc).unwrap()
    }

    fn matched(field_id: &str, value: FieldData) -> (String, FieldValue) {
        (
            field_id.to_string(),
            FieldValue {
                field_id: field_id.to_string(),
                value,
                source: ValueSource::Matched,
                confidence: 0.9,
                provenance: Provenance::Evidence {
                    index: 0,
                    position: None,
                },
            },
        )
    }

    #[test]
    fn test_drops_out_of_range_matched_values() {
        let mut diagnostics = Vec::new();
        let validator = RangeValidator::new(&hint_set(), &RangeOverrides::new(), &mut diagnostics);

        let values = BTreeMap::from([
            matched("gallons", FieldData::Number(55.0)),
            matched("station", FieldData::Text("Shell".to_string())),
            matched("total", FieldData::Number(9999.0)),
        ]);
        let validated = validator.validate(values, &mut diagnostics);

        assert!(!validated.contains_key("gallons"));
        assert!(validated.contains_key("station"));
        assert!(validated.contains_key("total"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::OutOfRange);
        assert_eq!(diagnostics[0].field_id.as_deref(), Some("gallons"));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut diagnostics = Vec::new();
        let validator = RangeValidator::new(&hint_set(), &RangeOverrides::new(), &mut diagnostics);
        let values = BTreeMap::from([matched("gallons", FieldData::Number(40.0))]);
        assert_eq!(validator.validate(values, &mut diagnostics).len(), 1);
    }

    #[test]
    fn test_override_takes_precedence() {
        let hints = hint_set();
        let mut diagnostics = Vec::new();
        let overrides = RangeOverrides::from([
            ("gallons".to_string(), ExpectedRange { min: 1.0, max: 150.0 }),
            ("total".to_string(), ExpectedRange { min: 0.0, max: 100.0 }),
        ]);
        let validator = RangeValidator::new(&hints, &overrides, &mut diagnostics);

        let values = BTreeMap::from([
            matched("gallons", FieldData::Number(120.0)),
            matched("total", FieldData::Number(250.0)),
        ]);
        let validated = validator.validate(values, &mut diagnostics);
        assert!(validated.contains_key("gallons"));
        assert!(!validated.contains_key("total"));

        // Cached hints are untouched
        assert_eq!(hints.get("gallons").unwrap().expected_range, ExpectedRange::new(1.0, 40.0));
        assert!(hints.get("total").unwrap().expected_range.is_none());
    }

    #[test]
    fn test_invalid_override_falls_back_to_hint_range() {
        let mut diagnostics = Vec::new();
        let overrides = RangeOverrides::from([
            ("gallons".to_string(), ExpectedRange { min: 10.0, max: 1.0 }),
            ("nonexistent".to_string(), ExpectedRange { min: 0.0, max: 1.0 }),
        ]);
        let validator = RangeValidator::new(&hint_set(), &overrides, &mut diagnostics);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::InvalidRangeOverride);
        assert_eq!(validator.range_for("gallons"), ExpectedRange::new(1.0, 40.0).as_ref());
        assert!(validator.range_for("nonexistent").is_none());
    }

    #[test]
    fn test_accepts_without_range() {
        let mut diagnostics = Vec::new();
        let validator = RangeValidator::new(&hint_set(), &RangeOverrides::new(), &mut diagnostics);
        assert!(validator.accepts("total", -1e9));
        assert!(!validator.accepts("gallons", 0.5));
    }
}
