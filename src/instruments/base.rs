use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

use crate::model::{Callable, ObjectId};

/// Where a wrapped callable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Instance(ObjectId),
    Class,
}

/// Descriptor handed to an instrument alongside the callable it wraps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// `module.Name` of the owning class.
    pub owner: String,
    pub method: String,
    pub scope: Scope,
}

impl Target {
    pub fn new(owner: impl Into<String>, method: impl Into<String>, scope: Scope) -> Self {
        Self {
            owner: owner.into(),
            method: method.into(),
            scope,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.method)
    }
}

/// Keyword configuration passed to the instrument on every wrap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentConfig(Map<String, JsonValue>);

impl InstrumentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, JsonValue>> for InstrumentConfig {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// Produces a replacement for `method` with the same calling convention.
///
/// The replacement must call `method` on every path it does not deliberately
/// short-circuit, and must let errors from it propagate.
pub trait Instrument: Send + Sync {
    fn wrap(&self, target: &Target, method: Callable, config: &InstrumentConfig) -> Callable;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Instrument for F
where
    F: Fn(&Target, Callable, &InstrumentConfig) -> Callable + Send + Sync,
{
    fn wrap(&self, target: &Target, method: Callable, config: &InstrumentConfig) -> Callable {
        self(target, method, config)
    }
}

pub type InstrumentRef = Arc<dyn Instrument>;

/// Instruments are compared by identity, never by what they produce.
pub fn same_instrument(a: &InstrumentRef, b: &InstrumentRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
