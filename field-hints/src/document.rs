//! Hint document parsing.
//!
//! A document is a map from field id to a hint object:
//!
//! ```json
//! {
//!   "total": {
//!     "keywords": ["total"],
//!     "keywords.es": ["total", "importe"],
//!     "expectedRange": { "min": 0, "max": 500 },
//!     "calculationGroups": [
//!       {
//!         "id": "fromPrice",
//!         "formula": "total = gallons * pricePerGallon",
//!         "dependentFields": ["gallons", "pricePerGallon"],
//!         "priority": 1
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! Shape errors reject the whole document. A formula that fails to parse, or
//! disagrees with its declared dependencies, only disables its own group.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::formula::{Formula, FormulaError};
use crate::repository::HintError;
use crate::source::{DocumentFormat, RawHintDocument};
use crate::types::{CalculationGroup, ExpectedRange, FieldHint, HintSet};

const KEYWORDS_KEY: &str = "keywords";
const LOCALIZED_KEYWORDS_PREFIX: &str = "keywords.";
const RANGE_KEY: &str = "expectedRange";
const GROUPS_KEY: &str = "calculationGroups";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRange {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawGroup {
    id: String,
    formula: String,
    dependent_fields: Vec<String>,
    priority: i64,
}

/// Parse a raw document into a [`HintSet`].
pub fn parse_document(model_name: &str, document: &RawHintDocument) -> Result<HintSet, HintError> {
    let malformed = |reason: String| HintError::MalformedHintSource {
        model: model_name.to_string(),
        origin: document.origin.clone(),
        reason,
    };

    let root: Value = match document.format {
        DocumentFormat::Json => serde_json::from_str(&document.body).map_err(|e| malformed(e.to_string()))?,
        DocumentFormat::Yaml => serde_yaml::from_str(&document.body).map_err(|e| malformed(e.to_string()))?,
    };

    let entries = match root {
        Value::Object(entries) => entries,
        other => {
            return Err(malformed(format!(
                "top level must be an object keyed by field id, found {}",
                value_kind(&other)
            )))
        }
    };

    let mut fields = BTreeMap::new();
    for (field_id, value) in entries {
        let hint = parse_field(&field_id, value).map_err(&malformed)?;
        fields.insert(field_id, hint);
    }

    let digest = hex::encode(Sha256::digest(document.body.as_bytes()));

    let hint_set = HintSet::new(model_name, document.origin.clone(), digest, fields);
    for (field_id, group) in hint_set.unusable_groups() {
        if let Err(e) = &group.compiled {
            tracing::warn!(
                model = %model_name,
                field = %field_id,
                group = %group.id,
                error = %e,
                "Calculation group disabled"
            );
        }
    }

    Ok(hint_set)
}

fn parse_field(field_id: &str, value: Value) -> Result<FieldHint, String> {
    if field_id.trim().is_empty() {
        return Err("field id must not be empty".to_string());
    }

    let object: Map<String, Value> = match value {
        Value::Object(object) => object,
        other => {
            return Err(format!(
                "field '{}' must be an object, found {}",
                field_id,
                value_kind(&other)
            ))
        }
    };

    let mut hint = FieldHint::new(field_id);

    for (key, value) in object {
        if key == KEYWORDS_KEY {
            hint.keywords = parse_keywords(field_id, &key, value)?;
        } else if let Some(locale) = key.strip_prefix(LOCALIZED_KEYWORDS_PREFIX) {
            if locale.is_empty() {
                return Err(format!("field '{}': empty locale in '{}'", field_id, key));
            }
            let keywords = parse_keywords(field_id, &key, value)?;
            hint.localized_keywords.insert(locale.to_string(), keywords);
        } else if key == RANGE_KEY {
            let raw: RawRange = serde_json::from_value(value)
                .map_err(|e| format!("field '{}': invalid {}: {}", field_id, RANGE_KEY, e))?;
            let range = ExpectedRange::new(raw.min, raw.max).ok_or_else(|| {
                format!(
                    "field '{}': {} requires finite min <= max (got {}..{})",
                    field_id, RANGE_KEY, raw.min, raw.max
                )
            })?;
            hint.expected_range = Some(range);
        } else if key == GROUPS_KEY {
            let raw: Vec<RawGroup> = serde_json::from_value(value)
                .map_err(|e| format!("field '{}': invalid {}: {}", field_id, GROUPS_KEY, e))?;
            hint.calculation_groups = parse_groups(field_id, raw)?;
        } else {
            return Err(format!("field '{}': unknown key '{}'", field_id, key));
        }
    }

    Ok(hint)
}

fn parse_keywords(field_id: &str, key: &str, value: Value) -> Result<Vec<String>, String> {
    let raw: Vec<String> = serde_json::from_value(value)
        .map_err(|e| format!("field '{}': '{}' must be a list of strings: {}", field_id, key, e))?;

    Ok(raw
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}

fn parse_groups(field_id: &str, raw: Vec<RawGroup>) -> Result<Vec<CalculationGroup>, String> {
    let mut seen = BTreeSet::new();
    let mut groups = Vec::with_capacity(raw.len());

    for group in raw {
        let id = group.id.trim().to_string();
        if id.is_empty() {
            return Err(format!("field '{}': calculation group id must not be empty", field_id));
        }
        if !seen.insert(id.clone()) {
            return Err(format!(
                "field '{}': duplicate calculation group '{}'",
                field_id, id
            ));
        }
        if group.dependent_fields.is_empty() {
            return Err(format!(
                "field '{}': group '{}' has no dependent fields",
                field_id, id
            ));
        }

        let dependent_fields: BTreeSet<String> = group
            .dependent_fields
            .iter()
            .map(|f| f.trim().to_string())
            .collect();
        if dependent_fields.contains(field_id) {
            return Err(format!(
                "field '{}': group '{}' depends on its own field",
                field_id, id
            ));
        }
        if dependent_fields.iter().any(|f| f.is_empty()) {
            return Err(format!(
                "field '{}': group '{}' has an empty dependent field id",
                field_id, id
            ));
        }

        let compiled = compile(field_id, &group.formula, &dependent_fields);

        groups.push(CalculationGroup {
            id,
            formula: group.formula,
            dependent_fields,
            priority: group.priority,
            compiled,
        });
    }

    // Stable: equal priorities keep document order.
    groups.sort_by_key(|g| g.priority);
    Ok(groups)
}

/// Parse a formula and check it against the owning field and declared dependencies.
fn compile(
    field_id: &str,
    source: &str,
    dependent_fields: &BTreeSet<String>,
) -> Result<Formula, FormulaError> {
    let formula = Formula::parse(source)?;

    if formula.target() != field_id {
        return Err(FormulaError::TargetMismatch {
            expected: field_id.to_string(),
            found: formula.target().to_string(),
        });
    }
    if let Some(undeclared) = formula.references().difference(dependent_fields).next() {
        return Err(FormulaError::UndeclaredDependency(undeclared.clone()));
    }
    if let Some(unused) = dependent_fields.difference(formula.references()).next() {
        return Err(FormulaError::UnusedDependency(unused.clone()));
    }

    Ok(formula)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
