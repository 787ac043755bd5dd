//! Calculation resolver - fills unknown fields from calculation groups.
//!
//! Runs full passes over the fields that are still unknown and declare at
//! least one calculation group, until a pass adds nothing or every such
//! field is filled. Within a field, groups are tried in ascending priority
//! and the first one that yields a value wins. Values computed earlier in a
//! pass are visible to later fields in the same pass, so dependency chains
//! settle in as few passes as their order allows. Fields caught in a cycle
//! with no numeric seed are simply left unresolved.
//!
//! The first group whose inputs are all present and numeric decides the
//! field: if evaluating it fails (division by zero, non-finite result) the
//! field stays unresolved and lower-priority groups are not consulted.
//!
//! Known values are never overwritten.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use field_hints::{CalculationGroup, EvalError, FieldHint, HintSet};

use crate::types::{Diagnostic, DiagnosticKind, FieldData, FieldValue, Provenance, ValueSource};
use crate::validator::RangeValidator;

/// Result of trying one group against the current known values.
enum Attempt {
    /// Produced a value
    Resolved(FieldValue),
    /// Some dependency is not known yet; may succeed in a later pass
    Waiting,
    /// Group can never apply; later groups may still
    Failed(Diagnostic),
    /// Group applied but its evaluation failed; the field stays unresolved
    Abandoned(Diagnostic),
}

/// Outcome of one pass over a single field.
enum FieldOutcome {
    Resolved(FieldValue),
    Pending,
    Abandoned,
}

/// Derives values for unknown fields from their calculation groups.
pub struct CalculationResolver<'a> {
    hints: &'a HintSet,
    ranges: &'a RangeValidator,
}

impl<'a> CalculationResolver<'a> {
    pub fn new(hints: &'a HintSet, ranges: &'a RangeValidator) -> Self {
        Self { hints, ranges }
    }

    /// Extend `known` with every value the groups can produce.
    pub fn resolve(
        &self,
        mut known: BTreeMap<String, FieldValue>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> BTreeMap<String, FieldValue> {
        let mut pending: Vec<&FieldHint> = self
            .hints
            .fields()
            .filter(|hint| hint.is_calculated() && !known.contains_key(&hint.field_id))
            .collect();

        // Groups that failed once fail identically later: known values only grow
        // and are never replaced, so their inputs cannot change.
        let mut settled: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut passes = 0usize;

        while !pending.is_empty() {
            passes += 1;
            let before = pending.len();

            pending.retain(|hint| {
                match self.resolve_field(*hint, &known, &mut settled, diagnostics) {
                    FieldOutcome::Resolved(value) => {
                        known.insert(hint.field_id.clone(), value);
                        false
                    }
                    FieldOutcome::Abandoned => false,
                    FieldOutcome::Pending => true,
                }
            });

            if pending.len() == before {
                break;
            }
        }

        debug!(
            passes,
            unresolved = pending.len(),
            "Calculation reached a fixed point"
        );

        known
    }

    fn resolve_field(
        &self,
        hint: &'a FieldHint,
        known: &BTreeMap<String, FieldValue>,
        settled: &mut BTreeSet<(&'a str, &'a str)>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> FieldOutcome {
        for group in &hint.calculation_groups {
            let key = (hint.field_id.as_str(), group.id.as_str());
            if settled.contains(&key) {
                continue;
            }

            match self.attempt(hint, group, known) {
                Attempt::Resolved(value) => {
                    debug!(
                        field = %hint.field_id,
                        group = %group.id,
                        confidence = value.confidence,
                        "Field calculated"
                    );
                    return FieldOutcome::Resolved(value);
                }
                Attempt::Waiting => {}
                Attempt::Failed(diagnostic) => {
                    report(diagnostic, diagnostics);
                    settled.insert(key);
                }
                Attempt::Abandoned(diagnostic) => {
                    report(diagnostic, diagnostics);
                    return FieldOutcome::Abandoned;
                }
            }
        }

        FieldOutcome::Pending
    }

    fn attempt(
        &self,
        hint: &FieldHint,
        group: &CalculationGroup,
        known: &BTreeMap<String, FieldValue>,
    ) -> Attempt {
        let diagnostic = |kind: DiagnosticKind, message: String| {
            Diagnostic::new(kind, message)
                .for_field(hint.field_id.clone())
                .for_group(group.id.clone())
        };
        let failed = |kind, message| Attempt::Failed(diagnostic(kind, message));
        let abandoned = |kind, message| Attempt::Abandoned(diagnostic(kind, message));

        let formula = match &group.compiled {
            Ok(formula) => formula,
            Err(e) => {
                return failed(
                    DiagnosticKind::FormulaParseError,
                    format!("formula '{}' unusable: {}", group.formula, e),
                )
            }
        };

        let mut confidence = 1.0f32;
        for dependency in &group.dependent_fields {
            let Some(value) = known.get(dependency) else {
                return Attempt::Waiting;
            };
            confidence = confidence.min(value.confidence);
        }

        // All present: now every input must be numeric.
        let mut inputs: BTreeMap<&str, f64> = BTreeMap::new();
        for dependency in &group.dependent_fields {
            match known.get(dependency).and_then(FieldValue::as_number) {
                Some(number) => {
                    inputs.insert(dependency.as_str(), number);
                }
                None => {
                    return failed(
                        DiagnosticKind::NonNumericOperand,
                        format!("input '{}' has no numeric value", dependency),
                    )
                }
            }
        }

        let number = match formula.evaluate(|id| inputs.get(id).copied()) {
            Ok(number) => number,
            Err(EvalError::DivisionByZero) => {
                return abandoned(
                    DiagnosticKind::DivisionByZero,
                    format!("division by zero in '{}'", group.formula),
                )
            }
            Err(EvalError::NonFiniteResult) => {
                return abandoned(
                    DiagnosticKind::NonFiniteResult,
                    format!("'{}' produced a non-finite result", group.formula),
                )
            }
            Err(EvalError::UnknownField(id)) => {
                // Compilation checks references against dependencies, so this
                // only happens if a group was built by hand.
                return failed(
                    DiagnosticKind::NonNumericOperand,
                    format!("input '{}' has no numeric value", id),
                );
            }
        };

        if !self.ranges.accepts(&hint.field_id, number) {
            let range = self.ranges.range_for(&hint.field_id);
            return failed(
                DiagnosticKind::OutOfRange,
                format!(
                    "calculated value {} outside {}",
                    number,
                    range.map_or_else(String::new, |r| format!("{}..{}", r.min, r.max))
                ),
            );
        }

        Attempt::Resolved(FieldValue {
            field_id: hint.field_id.clone(),
            value: FieldData::Number(number),
            source: ValueSource::Calculated,
            confidence,
            provenance: Provenance::Formula {
                group_id: group.id.clone(),
                inputs: group.dependent_fields.iter().cloned().collect(),
            },
        })
    }
}

fn report(diagnostic: Diagnostic, diagnostics: &mut Vec<Diagnostic>) {
    warn!(
        field = ?diagnostic.field_id,
        group = ?diagnostic.group_id,
        kind = ?diagnostic.kind,
        "{}",
        diagnostic.message
    );
    diagnostics.push(diagnostic);
}
