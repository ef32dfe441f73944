use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::InstrumentError;
use crate::instruments::InstrumentConfig;
use crate::model::ClassRef;

/// Prefix of every bookkeeping key. Attribute writes using it are rejected
/// and graph enumeration skips it.
pub const RECORD_PREFIX: &str = "__instrumentation__";

/// Methods instrumented when the settings do not name any.
pub const DEFAULT_METHODS: [&str; 8] = [
    "_fit",
    "_predict",
    "_predict_proba",
    "_transform",
    "fit",
    "predict",
    "predict_proba",
    "transform",
];

/// Class names excluded when the settings do not name any.
pub const DEFAULT_EXCLUDE: [&str; 1] = ["BaseDecisionTree"];

/// Bookkeeping key of the record for `method`.
pub fn record_key(method: &str) -> String {
    format!("{RECORD_PREFIX}{method}")
}

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RECORD_PREFIX)
}

/// Everything an `Instrumentor` needs besides the instrument itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentorSettings {
    pub methods: Vec<String>,
    pub exclude: Vec<String>,
    pub config: InstrumentConfig,
}

impl Default for InstrumentorSettings {
    fn default() -> Self {
        Self {
            methods: DEFAULT_METHODS.iter().map(|m| m.to_string()).collect(),
            exclude: DEFAULT_EXCLUDE.iter().map(|e| e.to_string()).collect(),
            config: InstrumentConfig::default(),
        }
    }
}

impl InstrumentorSettings {
    pub fn from_json(json: &str) -> Result<Self, InstrumentError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: InstrumentConfig) -> Self {
        self.config = config;
        self
    }

    /// Rejects method names that could never resolve or that would collide
    /// with bookkeeping keys.
    pub fn validate(&self) -> Result<(), InstrumentError> {
        for method in &self.methods {
            if method.is_empty() {
                return Err(InstrumentError::InvalidConfig(
                    "method names must not be empty".to_string(),
                ));
            }
            if is_reserved(method) {
                return Err(InstrumentError::InvalidConfig(format!(
                    "method `{method}` uses the reserved prefix `{RECORD_PREFIX}`"
                )));
            }
            if method.chars().any(|c| c.is_whitespace() || c == '.') {
                return Err(InstrumentError::InvalidConfig(format!(
                    "method `{method}` is not a plain identifier"
                )));
            }
        }
        for entry in &self.exclude {
            if entry.trim().is_empty() {
                return Err(InstrumentError::InvalidConfig(
                    "exclude entries must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Class names (or `module.Name` paths) that are never walked or targeted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    names: BTreeSet<String>,
}

impl ExcludeSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// True if `class` or any of its ancestors is excluded.
    pub fn excludes(&self, class: &ClassRef) -> bool {
        if self.names.is_empty() {
            return false;
        }
        class
            .ancestry()
            .iter()
            .any(|c| self.names.contains(c.name()) || self.names.contains(&c.path()))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
