//! Field hints for form recognition.
//!
//! A model (a kind of form, such as a fuel receipt) has one hint document
//! describing each of its fields:
//!
//! - **Keywords**: terms that identify the field in recognized text, with
//!   optional per-locale overrides
//! - **Expected range**: inclusive bounds for numeric values
//! - **Calculation groups**: prioritized formulas deriving the field from
//!   other fields
//!
//! # Key Components
//!
//! - [`HintRepository`]: read-through cache of parsed hint sets, keyed by model
//! - [`HintSource`]: trait for locating raw documents ([`FileHintSource`],
//!   [`InMemoryHintSource`])
//! - [`Formula`]: parsed `target = expression` formula with a tree-walking evaluator
//!
//! # Example
//!
//! ```ignore
//! use field_hints::{FileHintSource, HintRepository};
//!
//! let repository = HintRepository::new(FileHintSource::new(vec!["./hints".into()]));
//! let hints = repository.load("fuel_receipt", "es")?;
//! let keywords = hints.keywords("total");
//! ```

pub mod document;
pub mod formula;
pub mod repository;
pub mod source;
pub mod types;

pub use document::parse_document;
pub use formula::{BinaryOp, EvalError, Expr, Formula, FormulaError};
pub use repository::{CachedModel, HintError, HintRepository, LocalizedHints};
pub use source::{
    DocumentFormat, FileHintSource, HintSource, HintSourceConfig, InMemoryHintSource,
    RawHintDocument,
};
pub use types::*;
