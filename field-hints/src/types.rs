//! Core hint types.
//!
//! A [`HintSet`] is the parsed form of one model's hint document: a map from
//! field id to [`FieldHint`], each carrying recognition keywords, an optional
//! acceptable range, and candidate calculation formulas.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::formula::{Formula, FormulaError};

/// Inclusive numeric range a field's value must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    /// Lower bound (inclusive)
    pub min: f64,
    /// Upper bound (inclusive)
    pub max: f64,
}

impl ExpectedRange {
    /// Create a range, returning `None` unless both bounds are finite and `min <= max`.
    pub fn new(min: f64, max: f64) -> Option<Self> {
        let range = Self { min, max };
        range.is_valid().then_some(range)
    }

    /// Whether the bounds are finite and ordered.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Whether `value` lies within the bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// One candidate formula for deriving a field's value.
#[derive(Debug, Clone)]
pub struct CalculationGroup {
    /// Identifier, unique within the owning field
    pub id: String,
    /// Formula source text, `target = expression`
    pub formula: String,
    /// Field ids the formula reads
    pub dependent_fields: BTreeSet<String>,
    /// Lower value = higher precedence
    pub priority: i64,
    /// Parsed formula, or the reason it could not be used
    pub compiled: Result<Formula, FormulaError>,
}

impl CalculationGroup {
    /// Whether the formula parsed and agrees with the declared dependencies.
    pub fn is_usable(&self) -> bool {
        self.compiled.is_ok()
    }
}

/// Per-field recognition and calculation configuration.
#[derive(Debug, Clone)]
pub struct FieldHint {
    /// Field id, unique within the model
    pub field_id: String,
    /// Default-locale recognition terms
    pub keywords: Vec<String>,
    /// Per-locale keyword overrides, keyed by exact locale code
    pub localized_keywords: BTreeMap<String, Vec<String>>,
    /// Acceptable value range
    pub expected_range: Option<ExpectedRange>,
    /// Calculation groups, ordered by ascending priority
    pub calculation_groups: Vec<CalculationGroup>,
}

impl FieldHint {
    /// Create a hint with default keywords only.
    pub fn new(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            keywords: Vec::new(),
            localized_keywords: BTreeMap::new(),
            expected_range: None,
            calculation_groups: Vec::new(),
        }
    }

    /// Keywords to use for `locale`.
    ///
    /// Exact locale match only: `es-MX` does not fall back to `es`.
    pub fn keywords_for(&self, locale: &str) -> &[String] {
        self.localized_keywords
            .get(locale)
            .map(Vec::as_slice)
            .unwrap_or(&self.keywords)
    }

    /// Whether any calculation group is declared.
    pub fn is_calculated(&self) -> bool {
        !self.calculation_groups.is_empty()
    }
}

/// Parsed hint document for one model.
#[derive(Debug, Clone)]
pub struct HintSet {
    model_name: String,
    origin: String,
    digest: String,
    fields: BTreeMap<String, FieldHint>,
}

impl HintSet {
    pub fn new(
        model_name: impl Into<String>,
        origin: impl Into<String>,
        digest: impl Into<String>,
        fields: BTreeMap<String, FieldHint>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            origin: origin.into(),
            digest: digest.into(),
            fields,
        }
    }

    /// Model this hint set describes.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Where the document was read from (path or label).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// SHA-256 of the raw document body, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldHint> {
        self.fields.get(field_id)
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.fields.contains_key(field_id)
    }

    /// Hints in ascending field id order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldHint> {
        self.fields.values()
    }

    /// Field ids in ascending order.
    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Groups whose formula could not be compiled, as `(field_id, group)`.
    pub fn unusable_groups(&self) -> Vec<(&str, &CalculationGroup)> {
        self.fields()
            .flat_map(|hint| {
                hint.calculation_groups
                    .iter()
                    .filter(|group| !group.is_usable())
                    .map(move |group| (hint.field_id.as_str(), group))
            })
            .collect()
    }
}
