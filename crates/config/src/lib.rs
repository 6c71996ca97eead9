//! Configuration for the course assistant NLU core.
//!
//! All rule tables that used to be scattered literals — intent keyword and
//! pattern lists, deny-lists, the period-inference table, thresholds and
//! toggles — live here as immutable typed structures, loaded once at startup.
//! The matching engines in the `nlu` crate are data-driven over these tables,
//! so precedence is explicit and testable in isolation.
//!
//! Layering: embedded defaults (the `standard()` constructors) plus an
//! optional YAML override file.

pub mod lexicon;
pub mod rules;
pub mod settings;

pub use lexicon::{Lexicon, PeriodRule, PeriodTable};
pub use rules::{IntentRule, RuleSet, RuleSpec};
pub use settings::{FeatureToggles, NluSettings, Thresholds, TimeoutSettings, TtlSettings};

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid rule pattern for {intent}: {pattern}")]
    InvalidPattern { intent: String, pattern: String },

    #[error("unknown intent tag in rules: {0}")]
    UnknownIntent(String),
}

/// Root configuration object passed into the classifier and extractor
/// constructors. Feature checks go through this, never through process-wide
/// environment state.
#[derive(Debug, Clone)]
pub struct NluConfig {
    pub settings: NluSettings,
    pub rules: RuleSet,
    pub lexicon: Lexicon,
    pub periods: PeriodTable,
}

/// Serde shape of the YAML override file. Every section is optional and
/// defaults to the embedded standard tables.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: NluSettings,
    #[serde(default)]
    rules: Option<Vec<RuleSpec>>,
    #[serde(default)]
    lexicon: Lexicon,
    #[serde(default)]
    periods: PeriodTable,
}

impl NluConfig {
    /// The embedded default configuration.
    pub fn standard() -> Self {
        Self {
            settings: NluSettings::default(),
            rules: RuleSet::standard(),
            lexicon: Lexicon::default(),
            periods: PeriodTable::default(),
        }
    }

    /// Load configuration from a YAML file, with missing sections falling
    /// back to the embedded defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw: RawConfig = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        let rules = match raw.rules {
            Some(specs) => RuleSet::compile(specs)?,
            None => RuleSet::standard(),
        };

        Ok(Self {
            settings: raw.settings,
            rules,
            lexicon: raw.lexicon,
            periods: raw.periods,
        })
    }
}

impl Default for NluConfig {
    fn default() -> Self {
        Self::standard()
    }
}
