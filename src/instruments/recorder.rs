use std::sync::{MutexGuard, PoisonError};
use std::time::Instant;

use super::base::{Instrument, InstrumentConfig, Target};
use crate::model::Callable;
use crate::telemetry::{SharedRecorder, TelemetryEvent, TelemetryRecorder, TelemetrySnapshot};

/// Records every call into a shared `TelemetryRecorder`.
///
/// Events are keyed by the `label` config entry when present, otherwise by
/// `Owner.method`. The recorder lock is never held while the wrapped
/// callable runs, so nested instrumented calls record in order.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    recorder: SharedRecorder,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recorder(recorder: SharedRecorder) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &SharedRecorder {
        &self.recorder
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.lock().snapshot()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.lock().events().cloned().collect()
    }

    /// Targets in the order their calls were entered.
    pub fn entered(&self) -> Vec<String> {
        self.lock()
            .events()
            .filter(|event| event.is_entering())
            .map(|event| event.target().to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryRecorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Instrument for CallRecorder {
    fn wrap(&self, target: &Target, method: Callable, config: &InstrumentConfig) -> Callable {
        let target = config
            .str("label")
            .map(str::to_string)
            .unwrap_or_else(|| target.to_string());
        let recorder = self.clone();
        Callable::new(move |this, args| {
            recorder.lock().record(TelemetryEvent::Entering {
                target: target.clone(),
            });
            let start = Instant::now();
            let result = method.call(this, args);
            let elapsed_micros = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
            let event = match &result {
                Ok(_) => TelemetryEvent::Exiting {
                    target: target.clone(),
                    elapsed_micros,
                },
                Err(err) => TelemetryEvent::Failed {
                    target: target.clone(),
                    elapsed_micros,
                    error: err.to_string(),
                },
            };
            recorder.lock().record(event);
            result
        })
    }

    fn name(&self) -> &str {
        "CallRecorder"
    }
}
