//! Resolution engine - runs one resolution call end to end.
//!
//! load hints -> match evidence -> validate ranges -> calculate gaps
//!
//! Each stage runs exactly once per call. Only hint loading can fail the
//! call; everything after it reports problems as diagnostics and returns
//! whatever it could resolve.

use std::sync::Arc;

use tracing::{debug, info};

use field_hints::{FileHintSource, HintRepository, HintSet};

use crate::calculation::CalculationResolver;
use crate::config::EngineConfig;
use crate::extract::ValueExtractor;
use crate::matcher::FieldMatcher;
use crate::types::{
    Diagnostic, DiagnosticKind, EvidenceSpan, RangeOverrides, ResolutionResult, Result,
};
use crate::validator::RangeValidator;

/// Resolves evidence into field values for any model the repository knows.
///
/// The engine holds no per-call state, so one instance can serve concurrent
/// callers. The hint repository is shared and may be handed to other engines.
pub struct ResolutionEngine {
    repository: Arc<HintRepository>,
    matcher: FieldMatcher,
    extractor: ValueExtractor,
    default_locale: String,
}

impl ResolutionEngine {
    /// Create an engine over an existing repository.
    pub fn new(repository: Arc<HintRepository>, config: &EngineConfig) -> Self {
        Self {
            repository,
            matcher: FieldMatcher::new(&config.matcher),
            extractor: ValueExtractor::new(&config.extraction),
            default_locale: config.default_locale.clone(),
        }
    }

    /// Create an engine reading hint documents from the configured search paths.
    pub fn from_config(config: &EngineConfig) -> Self {
        let source = FileHintSource::from_config(&config.hints);
        Self::new(Arc::new(HintRepository::new(source)), config)
    }

    /// The shared hint repository.
    pub fn repository(&self) -> &Arc<HintRepository> {
        &self.repository
    }

    /// Locale used when the caller passes an empty one.
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Resolve `evidence` against the hints for `model_name`.
    ///
    /// Fails only when the model's hints cannot be loaded.
    pub fn resolve_fields(
        &self,
        model_name: &str,
        locale: &str,
        evidence: &[EvidenceSpan],
        overrides: &RangeOverrides,
    ) -> Result<ResolutionResult> {
        let locale = if locale.is_empty() {
            self.default_locale.as_str()
        } else {
            locale
        };

        let hints = self.repository.load(model_name, locale)?;
        let mut diagnostics = evidence_diagnostics(evidence);

        let matched = self.matcher.match_fields(evidence, &hints, &self.extractor);
        debug!(model = %model_name, matched = matched.len(), "Evidence matched");

        let ranges = RangeValidator::new(hints.hint_set(), overrides, &mut diagnostics);
        let validated = ranges.validate(matched, &mut diagnostics);

        let values = CalculationResolver::new(hints.hint_set(), &ranges)
            .resolve(validated, &mut diagnostics);

        let unresolved = unresolved_fields(hints.hint_set(), |id| values.contains_key(id));

        info!(
            model = %model_name,
            locale = %locale,
            resolved = values.len(),
            unresolved = unresolved.len(),
            diagnostics = diagnostics.len(),
            "Fields resolved"
        );

        Ok(ResolutionResult {
            model_name: model_name.to_string(),
            locale: locale.to_string(),
            hint_digest: hints.hint_set().digest().to_string(),
            values,
            unresolved,
            diagnostics,
        })
    }

    /// Drop cached hints for `model_name`; the next call re-reads them.
    pub fn invalidate(&self, model_name: &str) -> bool {
        self.repository.invalidate(model_name)
    }

    /// Re-read hints for `model_name`, keeping the cached set if that fails.
    pub fn reload(&self, model_name: &str) -> Result<Arc<HintSet>> {
        Ok(self.repository.reload(model_name)?)
    }
}

fn evidence_diagnostics(evidence: &[EvidenceSpan]) -> Vec<Diagnostic> {
    evidence
        .iter()
        .enumerate()
        .filter(|(_, span)| !span.has_valid_confidence())
        .map(|(index, span)| {
            Diagnostic::new(
                DiagnosticKind::InvalidEvidence,
                format!(
                    "span {} has confidence {} outside 0..1, skipped",
                    index, span.confidence
                ),
            )
        })
        .collect()
}

fn unresolved_fields(hints: &HintSet, is_resolved: impl Fn(&str) -> bool) -> Vec<String> {
    hints
        .field_ids()
        .filter(|id| !is_resolved(*id))
        .map(str::to_string)
        .collect()
}
