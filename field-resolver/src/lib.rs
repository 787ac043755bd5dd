//! Field resolution for recognized forms.
//!
//! Turns uncertain text spans from a recognition stage into validated values
//! for a model's named fields, filling gaps through the model's declared
//! calculation formulas.
//!
//! # Pipeline
//!
//! 1. **Load** the model's hints from the shared [`HintRepository`](field_hints::HintRepository)
//! 2. **Match** evidence spans to fields by keyword score ([`FieldMatcher`])
//! 3. **Validate** matched numbers against expected ranges ([`RangeValidator`])
//! 4. **Calculate** unknown fields to a fixed point ([`CalculationResolver`])
//!
//! [`ResolutionEngine`] runs the pipeline. Every value in the result carries
//! its source (matched or calculated), a confidence and its provenance;
//! non-fatal problems come back as [`Diagnostic`]s.
//!
//! # Example
//!
//! ```ignore
//! use field_resolver::{EngineConfig, EvidenceSpan, RangeOverrides, ResolutionEngine};
//!
//! let engine = ResolutionEngine::from_config(&EngineConfig::default());
//! let evidence = vec![
//!     EvidenceSpan::new("5.5 gal", 0.9),
//!     EvidenceSpan::new("$3.29/gal", 0.8),
//! ];
//! let result = engine.resolve_fields("fuel_receipt", "en", &evidence, &RangeOverrides::new())?;
//! println!("total = {:?}", result.number("total"));
//! ```

pub mod calculation;
pub mod config;
pub mod engine;
pub mod extract;
pub mod matcher;
pub mod types;
pub mod validator;

pub use calculation::CalculationResolver;
pub use config::{EngineConfig, ExtractionConfig, MatcherConfig};
pub use engine::ResolutionEngine;
pub use extract::{parse_first_number, ValueExtractor};
pub use matcher::{FieldMatcher, MatchAssignment};
pub use types::*;
pub use validator::RangeValidator;
