//! Instrumented-call telemetry.
//!
//! Telemetry is a side-effect layer: nothing in the engine reads it back.
//! Events carry target names, durations and error messages only; argument
//! and return values are never recorded.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::TelemetryEvent;
pub use metrics::{compute_snapshot, TargetStats, TelemetrySnapshot};
pub use recorder::{SharedRecorder, TelemetryRecorder, MAX_EVENTS};
