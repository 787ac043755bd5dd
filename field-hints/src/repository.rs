//! Cached hint repository.
//!
//! One parsed [`HintSet`] is cached per model name. Locale resolution happens
//! when hints are read, so a single cached parse serves every locale.
//!
//! Readers receive an `Arc<HintSet>`; `invalidate` and `reload` swap the map
//! entry, so a reader that already holds the old set keeps a consistent view
//! while new callers see the new one.
//!
//! Each model has a generation that `invalidate`, `invalidate_all` and
//! `reload` advance. A cache miss records the generation before fetching and
//! only caches its parse if the generation is unchanged, so a fetch that
//! straddles an invalidation never puts stale hints back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::document::parse_document;
use crate::source::HintSource;
use crate::types::{FieldHint, HintSet};

/// Error types for hint loading.
#[derive(Debug, thiserror::Error)]
pub enum HintError {
    /// No hint document resolves for the model
    #[error("No hint configuration found for model '{0}'")]
    ConfigNotFound(String),

    /// Hint document exists but cannot be parsed
    #[error("Malformed hint source for model '{model}' ({origin}): {reason}")]
    MalformedHintSource {
        model: String,
        origin: String,
        reason: String,
    },

    /// Model name is not usable as a lookup key
    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),

    /// Document was located but could not be read
    #[error("Hint source unavailable for model '{model}': {reason}")]
    SourceUnavailable { model: String, reason: String },
}

struct CacheEntry {
    hints: Arc<HintSet>,
    loaded_at: DateTime<Utc>,
}

/// Summary of one cached model, for diagnostics.
#[derive(Debug, Clone)]
pub struct CachedModel {
    pub model_name: String,
    pub digest: String,
    pub field_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Read-through cache of parsed hint sets.
///
/// Callers own the repository and share it (typically behind an `Arc`)
/// between resolution calls.
pub struct HintRepository {
    source: Arc<dyn HintSource>,
    cache: DashMap<String, CacheEntry>,
    /// Per-model generation, advanced by `invalidate` and `reload`
    generations: DashMap<String, u64>,
    /// Advanced by `invalidate_all`
    epoch: AtomicU64,
}

/// Snapshot of a model's cache generation.
type Generation = (u64, u64);

impl HintRepository {
    /// Create a repository over `source`.
    pub fn new(source: impl HintSource + 'static) -> Self {
        Self::with_source(Arc::new(source))
    }

    /// Create a repository over a shared source.
    pub fn with_source(source: Arc<dyn HintSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            generations: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &Arc<dyn HintSource> {
        &self.source
    }

    /// Get the hint set for `model_name`, fetching and parsing on a cache miss.
    ///
    /// Parse failures are returned and nothing is cached, so a bad document
    /// never affects other models and is retried on the next call.
    pub fn hint_set(&self, model_name: &str) -> Result<Arc<HintSet>, HintError> {
        if let Some(entry) = self.cache.get(model_name) {
            return Ok(Arc::clone(&entry.hints));
        }

        let generation = self.generation(model_name);
        let parsed = Arc::new(self.fetch_and_parse(model_name)?);

        match self.cache.entry(model_name.to_string()) {
            // Another caller filled the entry meanwhile; its parse wins.
            Entry::Occupied(entry) => Ok(Arc::clone(&entry.get().hints)),
            Entry::Vacant(vacant) => {
                if self.generation(model_name) != generation {
                    debug!(model = %model_name, "Hints invalidated during fetch, not caching");
                    return Ok(parsed);
                }

                let entry = vacant.insert(CacheEntry {
                    hints: parsed,
                    loaded_at: Utc::now(),
                });
                info!(
                    model = %model_name,
                    fields = entry.hints.len(),
                    digest = %entry.hints.digest(),
                    "Hint set cached"
                );
                Ok(Arc::clone(&entry.hints))
            }
        }
    }

    /// Load hints for `model_name` as seen from `locale`.
    pub fn load(&self, model_name: &str, locale: &str) -> Result<LocalizedHints, HintError> {
        let hints = self.hint_set(model_name)?;
        Ok(LocalizedHints {
            hints,
            locale: locale.to_string(),
        })
    }

    /// Drop the cached entry for `model_name`. Returns whether one existed.
    pub fn invalidate(&self, model_name: &str) -> bool {
        self.advance_generation(model_name);
        let removed = self.cache.remove(model_name).is_some();
        info!(model = %model_name, removed, "Hint cache invalidated");
        removed
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        let count = self.cache.len();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
        info!(count, "Hint cache cleared");
    }

    /// Re-read the document for `model_name` and swap it in.
    ///
    /// The new document is parsed before the swap; if that fails the previous
    /// entry (if any) stays cached and the error is returned.
    pub fn reload(&self, model_name: &str) -> Result<Arc<HintSet>, HintError> {
        let parsed = match self.fetch_and_parse(model_name) {
            Ok(parsed) => Arc::new(parsed),
            Err(e) => {
                warn!(model = %model_name, error = %e, "Reload failed, keeping cached hints");
                return Err(e);
            }
        };

        self.advance_generation(model_name);
        self.cache.insert(
            model_name.to_string(),
            CacheEntry {
                hints: Arc::clone(&parsed),
                loaded_at: Utc::now(),
            },
        );
        info!(model = %model_name, digest = %parsed.digest(), "Hint set reloaded");

        Ok(parsed)
    }

    /// Models currently cached, sorted by name.
    pub fn cached_models(&self) -> Vec<CachedModel> {
        let mut models: Vec<CachedModel> = self
            .cache
            .iter()
            .map(|entry| CachedModel {
                model_name: entry.key().clone(),
                digest: entry.hints.digest().to_string(),
                field_count: entry.hints.len(),
                loaded_at: entry.loaded_at,
            })
            .collect();
        models.sort_by(|a, b| a.model_name.cmp(&b.model_name));
        models
    }

    fn generation(&self, model_name: &str) -> Generation {
        let model = self.generations.get(model_name).map_or(0, |g| *g);
        (self.epoch.load(Ordering::SeqCst), model)
    }

    fn advance_generation(&self, model_name: &str) {
        *self.generations.entry(model_name.to_string()).or_insert(0) += 1;
    }

    fn fetch_and_parse(&self, model_name: &str) -> Result<HintSet, HintError> {
        debug!(model = %model_name, source = %self.source.describe(), "Fetching hint document");
        let document = self.source.fetch(model_name)?;
        parse_document(model_name, &document).map_err(|e| {
            warn!(model = %model_name, error = %e, "Rejected hint document");
            e
        })
    }
}

/// A cached hint set paired with the locale it is read under.
#[derive(Debug, Clone)]
pub struct LocalizedHints {
    hints: Arc<HintSet>,
    locale: String,
}

impl LocalizedHints {
    pub fn new(hints: Arc<HintSet>, locale: impl Into<String>) -> Self {
        Self {
            hints,
            locale: locale.into(),
        }
    }

    pub fn hint_set(&self) -> &HintSet {
        &self.hints
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldHint> {
        self.hints.get(field_id)
    }

    /// Keywords for `field_id` under this locale; empty if the field is unknown.
    pub fn keywords(&self, field_id: &str) -> &[String] {
        self.hints
            .get(field_id)
            .map(|hint| hint.keywords_for(&self.locale))
            .unwrap_or(&[])
    }
}
