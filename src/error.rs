use thiserror::Error;

/// Errors surfaced by the public instrumentation API.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// The requested name does not resolve to anything callable on the owner.
    /// Callers inside the engine treat this as a silent skip.
    #[error("no callable named `{method}` on {owner}")]
    UnresolvableCallable { owner: String, method: String },

    /// A delegator has no inner function that could be wrapped.
    #[error("delegator `{owner}.{method}` has no inner function to wrap")]
    AmbiguousDelegate { owner: String, method: String },

    #[error("invalid instrumentor configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to import module `{module}`: {reason}")]
    ImportFailure { module: String, reason: String },

    #[error("failed to parse instrumentor settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Errors raised by invoking a callable of the object model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("'{class}' object has no attribute '{name}'")]
    MissingAttribute { class: String, name: String },

    #[error("'{class}.{name}' is not callable")]
    NotCallable { class: String, name: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors raised when mutating the object model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("attribute name `{0}` uses the reserved instrumentation prefix")]
    ReservedName(String),
}

/// A node refused to expose its children during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read attributes of {node}: {reason}")]
pub struct AccessError {
    pub node: String,
    pub reason: String,
}

impl AccessError {
    pub fn new(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
        }
    }
}
