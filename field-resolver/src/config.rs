//! Configuration for the resolution engine.

use serde::{Deserialize, Serialize};

use field_hints::HintSourceConfig;

/// Configuration for a [`ResolutionEngine`](crate::ResolutionEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Locale used when the caller does not name one
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// Where hint documents are read from
    #[serde(default)]
    pub hints: HintSourceConfig,
    /// Matcher configuration
    #[serde(default)]
    pub matcher: MatcherConfig,
    /// Number extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            hints: HintSourceConfig::default(),
            matcher: MatcherConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn default_locale() -> String {
    "en".to_string()
}

/// Matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Spans with confidence below this are never matched
    #[serde(default)]
    pub min_confidence: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
        }
    }
}

/// Number extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Language codes whose numbers use `,` as the decimal separator
    #[serde(default = "default_decimal_comma_locales")]
    pub decimal_comma_locales: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            decimal_comma_locales: default_decimal_comma_locales(),
        }
    }
}

fn default_decimal_comma_locales() -> Vec<String> {
    [
        "cs", "da", "de", "es", "fi", "fr", "it", "nb", "nl", "pl", "pt", "ru", "sv", "tr",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
