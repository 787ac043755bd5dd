//! hintctl subcommands.

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Subcommand;
use tracing::info;

use field_hints::ExpectedRange;
use field_resolver::{EvidenceSpan, RangeOverrides, ResolutionEngine};

/// hintctl commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve fields from an evidence file and print the result as JSON
    Resolve {
        /// Model name (hint document stem)
        model: String,

        /// JSON file holding an array of evidence spans
        evidence: PathBuf,

        /// Locale for keyword selection and number parsing
        #[arg(short, long, env = "HINTCTL_LOCALE")]
        locale: Option<String>,

        /// Range override for one field, as field=min:max (repeatable)
        #[arg(short, long = "range", value_parser = parse_range_override)]
        ranges: Vec<(String, ExpectedRange)>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Load a model's hints and report problems
    Check {
        /// Model name (hint document stem)
        model: String,

        /// Locale whose keywords are listed
        #[arg(short, long, env = "HINTCTL_LOCALE")]
        locale: Option<String>,
    },
}

/// Run a command, returning what should be printed to stdout.
pub fn execute_command(engine: &ResolutionEngine, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Resolve {
            model,
            evidence,
            locale,
            ranges,
            pretty,
        } => {
            let body = std::fs::read_to_string(&evidence)
                .with_context(|| format!("reading evidence file {}", evidence.display()))?;
            let spans: Vec<EvidenceSpan> = serde_json::from_str(&body)
                .with_context(|| format!("parsing evidence file {}", evidence.display()))?;
            let overrides: RangeOverrides = ranges.into_iter().collect();
            let locale = locale.unwrap_or_default();

            info!(model = %model, spans = spans.len(), overrides = overrides.len(), "Resolving");
            let result = engine.resolve_fields(&model, &locale, &spans, &overrides)?;

            let output = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            Ok(output)
        }

        Commands::Check { model, locale } => {
            let locale = locale.unwrap_or_else(|| engine.default_locale().to_string());
            let hints = engine.repository().load(&model, &locale)?;
            let hint_set = hints.hint_set();

            let mut report = String::new();
            writeln!(report, "Model: {} ({} fields)", hint_set.model_name(), hint_set.len())?;
            writeln!(report, "Source: {}", hint_set.origin())?;
            writeln!(report, "Digest: {}", hint_set.digest())?;

            for hint in hint_set.fields() {
                writeln!(report)?;
                writeln!(report, "{}", hint.field_id)?;
                writeln!(
                    report,
                    "  keywords [{}]: {}",
                    locale,
                    hints.keywords(&hint.field_id).join(", ")
                )?;
                if let Some(range) = &hint.expected_range {
                    writeln!(report, "  range: {}..{}", range.min, range.max)?;
                }
                for group in &hint.calculation_groups {
                    let status = match &group.compiled {
                        Ok(_) => "ok".to_string(),
                        Err(e) => format!("UNUSABLE: {}", e),
                    };
                    writeln!(
                        report,
                        "  group {} (priority {}): {} [{}]",
                        group.id, group.priority, group.formula, status
                    )?;
                }
            }

            let unusable = hint_set.unusable_groups().len();
            if unusable > 0 {
                bail!(
                    "{}\n{} calculation group(s) in '{}' cannot be used",
                    report.trim_end(),
                    unusable,
                    model
                );
            }

            Ok(report)
        }
    }
}

/// Parse `field=min:max`.
pub fn parse_range_override(s: &str) -> Result<(String, ExpectedRange), String> {
    let (field_id, bounds) = s
        .split_once('=')
        .ok_or_else(|| format!("expected field=min:max, got '{}'", s))?;
    let (min, max) = bounds
        .split_once(':')
        .ok_or_else(|| format!("expected min:max after '=', got '{}'", bounds))?;

    let field_id = field_id.trim();
    if field_id.is_empty() {
        return Err("field id must not be empty".to_string());
    }
    let min: f64 = min
        .trim()
        .parse()
        .map_err(|e| format!("invalid min '{}': {}", min, e))?;
    let max: f64 = max
        .trim()
        .parse()
        .map_err(|e| format!("invalid max '{}': {}", max, e))?;

    // Unusable ranges are left to the engine, which reports them as diagnostics.
    Ok((field_id.to_string(), ExpectedRange { min, max }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use field_hints::{HintRepository, InMemoryHintSource};
    use field_resolver::EngineConfig;

    #[test]
    fn test_parse_range_override() {
        let (field, range) = parse_range_override("gallons=1:150").unwrap();
        assert_eq!(field, "gallons");
        assert_eq!(range, ExpectedRange { min: 1.0, max: 150.0 });

        let (_, range) = parse_range_override(" total = -5.5 : 1e3 ").unwrap();
        assert_eq!(range, ExpectedRange { min: -5.5, max: 1000.0 });
    }

    #[test]
    fn test_parse_range_override_errors() {
        assert!(parse_range_override("gallons").is_err());
        assert!(parse_range_override("gallons=10").is_err());
        assert!(parse_range_override("=1:2").is_err());
        assert!(parse_range_override("gallons=a:2").is_err());
    }

    fn engine(body: &str) -> ResolutionEngine {
        let source = InMemoryHintSource::new().with_json("fuel_receipt", body);
        ResolutionEngine::new(
            Arc::new(HintRepository::new(source)),
            &EngineConfig::default(),
        )
    }

    #[test]
    fn test_check_lists_fields() {
        let engine = engine(
            r#"{
            "gallons": { "keywords": ["gal"], "expectedRange": { "min": 0.5, "max": 40 } },
            "total": {
                "keywords": ["total"],
                "keywords.es": ["importe"],
                "calculationGroups": [
                    { "id": "product", "formula": "total = gallons * 2", "dependentFields": ["gallons"], "priority": 1 }
                ]
            }
        }"#,
        );
        let report = execute_command(
            &engine,
            Commands::Check {
                model: "fuel_receipt".to_string(),
                locale: Some("es".to_string()),
            },
        )
        .unwrap();

        assert!(report.contains("Model: fuel_receipt (2 fields)"));
        assert!(report.contains("  keywords [es]: importe"));
        assert!(report.contains("  range: 0.5..40"));
        assert!(report.contains("group product (priority 1): total = gallons * 2 [ok]"));
    }

    #[test]
    fn test_check_fails_on_unusable_group() {
        let engine = engine(
            r#"{
            "a": {},
            "b": { "calculationGroups": [ { "id": "g", "formula": "b = c", "dependentFields": ["a"], "priority": 1 } ] }
        }"#,
        );
        let err = execute_command(
            &engine,
            Commands::Check {
                model: "fuel_receipt".to_string(),
                locale: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("1 calculation group(s)"));
    }

    #[test]
    fn test_inverted_range_is_passed_through() {
        let (_, range) = parse_range_override("gallons=10:1").unwrap();
        assert!(!range.is_valid());
    }
}
