//! Hint sources.
//!
//! A [`HintSource`] locates the raw hint document for a model name. The
//! repository parses and caches what the source returns; sources themselves
//! hold no parsed state.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::repository::HintError;

/// Serialization format of a raw hint document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Infer the format from a file name; anything not `.yaml`/`.yml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// An unparsed hint document as returned by a source.
#[derive(Debug, Clone)]
pub struct RawHintDocument {
    /// Path or label identifying where the body came from
    pub origin: String,
    pub format: DocumentFormat,
    pub body: String,
}

/// Locates hint documents by model name.
pub trait HintSource: Send + Sync {
    /// Fetch the raw document for `model_name`.
    ///
    /// Returns [`HintError::ConfigNotFound`] when no document exists.
    fn fetch(&self, model_name: &str) -> Result<RawHintDocument, HintError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Where the file source looks for hint documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintSourceConfig {
    /// Directories searched in order
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,

    /// File name suffixes tried in order, without the leading dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for HintSourceConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            extensions: default_extensions(),
        }
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("./hints")]
}

fn default_extensions() -> Vec<String> {
    vec![
        "hints.json".to_string(),
        "hints.yaml".to_string(),
        "hints.yml".to_string(),
    ]
}

/// Reject names that could escape the search directories.
fn check_model_name(model_name: &str) -> Result<(), HintError> {
    let bad = model_name.is_empty()
        || model_name.contains('/')
        || model_name.contains('\\')
        || model_name.contains("..")
        || model_name.contains('\0');
    if bad {
        Err(HintError::InvalidModelName(model_name.to_string()))
    } else {
        Ok(())
    }
}

/// Reads `<model>.<extension>` from the first search path that has it.
pub struct FileHintSource {
    search_paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl FileHintSource {
    /// Create a source over `search_paths` with the default extensions.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            extensions: default_extensions(),
        }
    }

    pub fn from_config(config: &HintSourceConfig) -> Self {
        Self {
            search_paths: config.search_paths.clone(),
            extensions: config.extensions.clone(),
        }
    }

    /// Path that `fetch` would read for `model_name`, if any exists.
    pub fn locate(&self, model_name: &str) -> Result<Option<PathBuf>, HintError> {
        check_model_name(model_name)?;

        for dir in &self.search_paths {
            for ext in &self.extensions {
                let candidate = dir.join(format!("{}.{}", model_name, ext));
                if candidate.is_file() {
                    return Ok(Some(candidate));
                }
            }
        }

        Ok(None)
    }
}

impl HintSource for FileHintSource {
    fn fetch(&self, model_name: &str) -> Result<RawHintDocument, HintError> {
        let path = self
            .locate(model_name)?
            .ok_or_else(|| HintError::ConfigNotFound(model_name.to_string()))?;

        tracing::debug!(model = %model_name, path = %path.display(), "Reading hint document");

        let body = std::fs::read_to_string(&path).map_err(|e| HintError::SourceUnavailable {
            model: model_name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;

        Ok(RawHintDocument {
            origin: path.display().to_string(),
            format: DocumentFormat::from_path(&path),
            body,
        })
    }

    fn describe(&self) -> String {
        let paths: Vec<String> = self
            .search_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        format!("files in [{}]", paths.join(", "))
    }
}

/// Documents held in memory, replaceable at runtime.
#[derive(Default)]
pub struct InMemoryHintSource {
    documents: DashMap<String, RawHintDocument>,
}

impl InMemoryHintSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the document for `model_name`.
    pub fn insert(&self, model_name: impl Into<String>, format: DocumentFormat, body: impl Into<String>) {
        let model_name = model_name.into();
        let document = RawHintDocument {
            origin: format!("memory:{}", model_name),
            format,
            body: body.into(),
        };
        self.documents.insert(model_name, document);
    }

    /// Builder: add a JSON document.
    pub fn with_json(self, model_name: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(model_name, DocumentFormat::Json, body);
        self
    }

    pub fn remove(&self, model_name: &str) -> bool {
        self.documents.remove(model_name).is_some()
    }
}

impl HintSource for InMemoryHintSource {
    fn fetch(&self, model_name: &str) -> Result<RawHintDocument, HintError> {
        self.documents
            .get(model_name)
            .map(|doc| doc.clone())
            .ok_or_else(|| HintError::ConfigNotFound(model_name.to_string()))
    }

    fn describe(&self) -> String {
        format!("memory ({} documents)", self.documents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("fuel.hints.yaml")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("fuel.hints.yml")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("fuel.hints.json")),
            DocumentFormat::Json
        );
    }

    #[test]
    fn test_file_source_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("fuel.hints.json"), "{}").unwrap();
        std::fs::write(second.path().join("invoice.hints.yaml"), "{}").unwrap();

        let source = FileHintSource::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        let doc = source.fetch("fuel").unwrap();
        assert_eq!(doc.format, DocumentFormat::Json);
        assert!(doc.origin.ends_with("fuel.hints.json"));

        let doc = source.fetch("invoice").unwrap();
        assert_eq!(doc.format, DocumentFormat::Yaml);

        // Earlier directory shadows later ones
        std::fs::write(first.path().join("fuel.hints.json"), "{\"a\": {}}").unwrap();
        let doc = source.fetch("fuel").unwrap();
        assert_eq!(doc.body, "{\"a\": {}}");
    }

    #[test]
    fn test_file_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileHintSource::new(vec![dir.path().to_path_buf()]);
        assert!(matches!(
            source.fetch("missing"),
            Err(HintError::ConfigNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_model_name_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileHintSource::new(vec![dir.path().to_path_buf()]);
        for name in ["../secret", "a/b", "", "..\\x"] {
            assert!(matches!(
                source.fetch(name),
                Err(HintError::InvalidModelName(_))
            ));
        }
    }

    #[test]
    fn test_in_memory_replace_and_remove() {
        let source = InMemoryHintSource::new().with_json("fuel", "{}");
        assert_eq!(source.fetch("fuel").unwrap().body, "{}");

        source.insert("fuel", DocumentFormat::Yaml, "total: {}");
        let doc = source.fetch("fuel").unwrap();
        assert_eq!(doc.format, DocumentFormat::Yaml);
        assert_eq!(doc.origin, "memory:fuel");

        assert!(source.remove("fuel"));
        assert!(matches!(
            source.fetch("fuel"),
            Err(HintError::ConfigNotFound(_))
        ));
    }
}
