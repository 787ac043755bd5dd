//! End-to-end resolution tests.

use std::sync::Arc;

use field_hints::{DocumentFormat, ExpectedRange, HintError, HintRepository, InMemoryHintSource};
use field_resolver::{
    DiagnosticKind, EngineConfig, EvidenceSpan, FieldData, Provenance, RangeOverrides,
    ResolutionEngine, ResolveError, ValueSource,
};

const FUEL_RECEIPT: &str = r#"{
    "gallons": {
        "keywords": ["gal"],
        "expectedRange": { "min": 0.5, "max": 40 }
    },
    "pricePerGallon": {
        "keywords": ["/gal"],
        "expectedRange": { "min": 0.5, "max": 15 }
    },
    "total": {
        "keywords": ["total"],
        "keywords.es": ["total", "importe"],
        "expectedRange": { "min": 0, "max": 500 },
        "calculationGroups": [
            {
                "id": "product",
                "formula": "total = gallons * pricePerGallon",
                "dependentFields": ["gallons", "pricePerGallon"],
                "priority": 1
            }
        ]
    }
}"#;

const PAIR: &str = r#"{
    "a": { "keywords": ["alpha"] },
    "b": {
        "calculationGroups": [
            { "id": "double", "formula": "b = a * 2", "dependentFields": ["a"], "priority": 1 }
        ]
    }
}"#;

const CYCLE: &str = r#"{
    "x": {
        "keywords": ["xx"],
        "calculationGroups": [ { "id": "from_y", "formula": "x = y + 1", "dependentFields": ["y"], "priority": 1 } ]
    },
    "y": {
        "keywords": ["yy"],
        "calculationGroups": [ { "id": "from_x", "formula": "y = x - 1", "dependentFields": ["x"], "priority": 1 } ]
    }
}"#;

fn engine() -> ResolutionEngine {
    let source = InMemoryHintSource::new()
        .with_json("fuel_receipt", FUEL_RECEIPT)
        .with_json("pair", PAIR)
        .with_json("cycle", CYCLE)
        .with_json("broken", r#"{ "a": { "expectedRange": { "min": 5, "max": 1 } } }"#);
    ResolutionEngine::new(
        Arc::new(HintRepository::new(source)),
        &EngineConfig::default(),
    )
}

fn fuel_evidence() -> Vec<EvidenceSpan> {
    vec![
        EvidenceSpan::new("5.5 gal", 0.9),
        EvidenceSpan::new("$3.29/gal", 0.8),
        EvidenceSpan::new("$18.10 total", 0.95),
    ]
}

fn no_overrides() -> RangeOverrides {
    RangeOverrides::new()
}

#[test]
fn test_fuel_receipt_matched_total_wins() {
    let result = engine()
        .resolve_fields("fuel_receipt", "en", &fuel_evidence(), &no_overrides())
        .unwrap();

    assert_eq!(result.number("gallons"), Some(5.5));
    assert_eq!(result.number("pricePerGallon"), Some(3.29));
    assert_eq!(result.number("total"), Some(18.10));

    for field in ["gallons", "pricePerGallon", "total"] {
        assert_eq!(result.get(field).unwrap().source, ValueSource::Matched);
    }
    assert!(result.unresolved.is_empty());
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_fuel_receipt_calculates_missing_total() {
    let evidence: Vec<EvidenceSpan> = fuel_evidence().into_iter().take(2).collect();
    let result = engine()
        .resolve_fields("fuel_receipt", "en", &evidence, &no_overrides())
        .unwrap();

    let total = result.get("total").unwrap();
    assert_eq!(total.source, ValueSource::Calculated);
    assert!((total.as_number().unwrap() - 18.095).abs() < 1e-9);
    assert_eq!(total.confidence, 0.8);
    assert!(matches!(
        &total.provenance,
        Provenance::Formula { group_id, .. } if group_id == "product"
    ));
}

#[test]
fn test_matched_values_carry_evidence_position() {
    let evidence = vec![
        EvidenceSpan::new("5.5 gal", 0.9).with_position(serde_json::json!([10, 20, 80, 12])),
    ];
    let result = engine()
        .resolve_fields("fuel_receipt", "en", &evidence, &no_overrides())
        .unwrap();

    assert_eq!(
        result.get("gallons").unwrap().provenance,
        Provenance::Evidence {
            index: 0,
            position: Some(serde_json::json!([10, 20, 80, 12])),
        }
    );
}

#[test]
fn test_every_ranged_value_is_in_range() {
    let evidence = vec![
        EvidenceSpan::new("95 gal", 0.9),
        EvidenceSpan::new("$3.29/gal", 0.8),
        EvidenceSpan::new("$900 total", 0.95),
    ];
    let overrides = RangeOverrides::from([(
        "pricePerGallon".to_string(),
        ExpectedRange { min: 4.0, max: 6.0 },
    )]);
    let engine = engine();
    let result = engine
        .resolve_fields("fuel_receipt", "en", &evidence, &overrides)
        .unwrap();

    let hints = engine.repository().hint_set("fuel_receipt").unwrap();
    for (field_id, value) in &result.values {
        let range = overrides
            .get(field_id)
            .or(hints.get(field_id).and_then(|h| h.expected_range.as_ref()));
        if let (Some(range), Some(number)) = (range, value.as_number()) {
            assert!(range.contains(number), "{} = {} outside range", field_id, number);
        }
    }
    assert_eq!(result.unresolved, vec!["gallons", "pricePerGallon", "total"]);
    assert_eq!(result.diagnostics_of(DiagnosticKind::OutOfRange).count(), 3);
}

#[test]
fn test_override_applies_to_one_call_only() {
    let engine = engine();
    let evidence = vec![EvidenceSpan::new("55 gal", 0.9)];
    let wide = RangeOverrides::from([(
        "gallons".to_string(),
        ExpectedRange { min: 1.0, max: 150.0 },
    )]);

    let with_override = engine
        .resolve_fields("fuel_receipt", "en", &evidence, &wide)
        .unwrap();
    assert_eq!(with_override.number("gallons"), Some(55.0));

    let without = engine
        .resolve_fields("fuel_receipt", "en", &evidence, &no_overrides())
        .unwrap();
    assert!(!without.is_resolved("gallons"));
}

#[test]
fn test_dependent_filled_exactly_when_input_numeric() {
    let engine = engine();

    let numeric = engine
        .resolve_fields("pair", "en", &[EvidenceSpan::new("alpha 21", 0.6)], &no_overrides())
        .unwrap();
    assert_eq!(numeric.number("b"), Some(42.0));
    assert_eq!(numeric.get("b").unwrap().confidence, 0.6);

    let text = engine
        .resolve_fields("pair", "en", &[EvidenceSpan::new("alpha", 0.6)], &no_overrides())
        .unwrap();
    assert_eq!(
        text.get("a").unwrap().value,
        FieldData::Text("alpha".to_string())
    );
    assert!(!text.is_resolved("b"));
    assert_eq!(text.unresolved, vec!["b"]);
    assert_eq!(text.diagnostics_of(DiagnosticKind::NonNumericOperand).count(), 1);

    let missing = engine
        .resolve_fields("pair", "en", &[EvidenceSpan::new("beta 3", 0.6)], &no_overrides())
        .unwrap();
    assert_eq!(missing.unresolved, vec!["a", "b"]);
    assert!(missing.diagnostics.is_empty());
}

#[test]
fn test_locale_keywords_exact_match_only() {
    let engine = engine();
    let evidence = vec![EvidenceSpan::new("importe 42,50", 0.9)];

    let es = engine
        .resolve_fields("fuel_receipt", "es", &evidence, &no_overrides())
        .unwrap();
    assert_eq!(es.number("total"), Some(42.5));

    let en = engine
        .resolve_fields("fuel_receipt", "en", &evidence, &no_overrides())
        .unwrap();
    assert!(!en.is_resolved("total"));

    // No region-to-language fallback
    let es_mx = engine
        .resolve_fields("fuel_receipt", "es-MX", &evidence, &no_overrides())
        .unwrap();
    assert!(!es_mx.is_resolved("total"));
}

#[test]
fn test_resolution_is_idempotent() {
    let engine = engine();
    let evidence: Vec<EvidenceSpan> = fuel_evidence().into_iter().take(2).collect();

    let first = engine
        .resolve_fields("fuel_receipt", "en", &evidence, &no_overrides())
        .unwrap();
    let second = engine
        .resolve_fields("fuel_receipt", "en", &evidence, &no_overrides())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_cycle_without_evidence_is_unresolved() {
    let result = engine()
        .resolve_fields("cycle", "en", &[], &no_overrides())
        .unwrap();
    assert!(result.values.is_empty());
    assert_eq!(result.unresolved, vec!["x", "y"]);
}

#[test]
fn test_cycle_seeded_by_evidence_resolves() {
    let result = engine()
        .resolve_fields("cycle", "en", &[EvidenceSpan::new("xx 10", 0.7)], &no_overrides())
        .unwrap();
    assert_eq!(result.number("x"), Some(10.0));
    assert_eq!(result.number("y"), Some(9.0));
    assert_eq!(result.get("y").unwrap().source, ValueSource::Calculated);
}

#[test]
fn test_division_by_zero_does_not_fall_back() {
    let source = InMemoryHintSource::new().with_json(
        "timesheet",
        r#"{
            "hours": { "keywords": ["hrs"] },
            "total": { "keywords": ["total"] },
            "rate": {
                "calculationGroups": [
                    { "id": "div", "formula": "rate = total / hours", "dependentFields": ["total", "hours"], "priority": 1 },
                    { "id": "flat", "formula": "rate = total", "dependentFields": ["total"], "priority": 2 }
                ]
            }
        }"#,
    );
    let engine = ResolutionEngine::new(
        Arc::new(HintRepository::new(source)),
        &EngineConfig::default(),
    );

    let evidence = vec![
        EvidenceSpan::new("total 10", 0.9),
        EvidenceSpan::new("0 hrs", 0.9),
    ];
    let result = engine
        .resolve_fields("timesheet", "en", &evidence, &no_overrides())
        .unwrap();

    assert_eq!(result.number("hours"), Some(0.0));
    assert!(!result.is_resolved("rate"));
    assert_eq!(result.unresolved, vec!["rate"]);
    assert_eq!(result.diagnostics_of(DiagnosticKind::DivisionByZero).count(), 1);
}

#[test]
fn test_unknown_model_is_fatal() {
    let err = engine()
        .resolve_fields("parking_ticket", "en", &fuel_evidence(), &no_overrides())
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Hints(HintError::ConfigNotFound(ref model)) if model == "parking_ticket"
    ));
}

#[test]
fn test_malformed_model_does_not_affect_others() {
    let engine = engine();

    let err = engine
        .resolve_fields("broken", "en", &[], &no_overrides())
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Hints(HintError::MalformedHintSource { .. })
    ));

    let ok = engine
        .resolve_fields("fuel_receipt", "en", &fuel_evidence(), &no_overrides())
        .unwrap();
    assert_eq!(ok.number("total"), Some(18.10));

    let cached: Vec<String> = engine
        .repository()
        .cached_models()
        .into_iter()
        .map(|m| m.model_name)
        .collect();
    assert_eq!(cached, vec!["fuel_receipt"]);
}

#[test]
fn test_unusable_formula_reported_per_call() {
    let source = InMemoryHintSource::new();
    source.insert(
        "sheet",
        DocumentFormat::Yaml,
        r#"
a:
  keywords: [alpha]
b:
  calculationGroups:
    - id: broken
      formula: "b = a * (2"
      dependentFields: [a]
      priority: 1
    - id: fallback
      formula: "b = a + 1"
      dependentFields: [a]
      priority: 5
"#,
    );
    let engine = ResolutionEngine::new(
        Arc::new(HintRepository::new(source)),
        &EngineConfig::default(),
    );

    for _ in 0..2 {
        let result = engine
            .resolve_fields("sheet", "en", &[EvidenceSpan::new("alpha 4", 0.9)], &no_overrides())
            .unwrap();
        assert_eq!(result.number("b"), Some(5.0));
        let parse_errors: Vec<_> = result
            .diagnostics_of(DiagnosticKind::FormulaParseError)
            .collect();
        assert_eq!(parse_errors.len(), 1);
        assert_eq!(parse_errors[0].group_id.as_deref(), Some("broken"));
    }
}

#[test]
fn test_file_backed_engine() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fuel_receipt.hints.json"), FUEL_RECEIPT).unwrap();

    let mut config = EngineConfig::default();
    config.hints.search_paths = vec![dir.path().to_path_buf()];
    let engine = ResolutionEngine::from_config(&config);

    let result = engine
        .resolve_fields("fuel_receipt", "en", &fuel_evidence(), &no_overrides())
        .unwrap();
    assert_eq!(result.number("gallons"), Some(5.5));
    assert_eq!(result.hint_digest.len(), 64);

    // Edits are picked up only after invalidation
    std::fs::write(
        dir.path().join("fuel_receipt.hints.json"),
        r#"{ "gallons": { "keywords": ["gal"] } }"#,
    )
    .unwrap();
    let cached = engine
        .resolve_fields("fuel_receipt", "en", &fuel_evidence(), &no_overrides())
        .unwrap();
    assert_eq!(cached.hint_digest, result.hint_digest);

    assert!(engine.invalidate("fuel_receipt"));
    let fresh = engine
        .resolve_fields("fuel_receipt", "en", &fuel_evidence(), &no_overrides())
        .unwrap();
    assert_ne!(fresh.hint_digest, result.hint_digest);
    assert_eq!(fresh.values.len(), 1);
}
