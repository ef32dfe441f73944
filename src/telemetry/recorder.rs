use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::event::TelemetryEvent;
use super::metrics::{compute_snapshot, TelemetrySnapshot};

pub const MAX_EVENTS: usize = 10_000;

/// Recorder shared between the wrappers that feed it.
pub type SharedRecorder = Arc<Mutex<TelemetryRecorder>>;

/// Ring buffer of the most recent events; the oldest is evicted first.
#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<TelemetryEvent>,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedRecorder {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn record(&mut self, event: TelemetryEvent) {
        if self.buffer.len() >= MAX_EVENTS {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        compute_snapshot(&self.buffer)
    }

    pub fn events(&self) -> impl Iterator<Item = &TelemetryEvent> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
