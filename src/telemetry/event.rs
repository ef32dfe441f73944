use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    Entering {
        target: String,
    },

    Exiting {
        target: String,
        elapsed_micros: u64,
    },

    Failed {
        target: String,
        elapsed_micros: u64,
        error: String,
    },
}

impl TelemetryEvent {
    pub fn target(&self) -> &str {
        match self {
            TelemetryEvent::Entering { target }
            | TelemetryEvent::Exiting { target, .. }
            | TelemetryEvent::Failed { target, .. } => target,
        }
    }

    pub fn is_entering(&self) -> bool {
        matches!(self, TelemetryEvent::Entering { .. })
    }
}
