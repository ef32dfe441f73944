use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use super::event::TelemetryEvent;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetrySnapshot {
    /// Calls entered across all targets.
    pub calls: u64,
    pub failures: u64,
    pub targets: BTreeMap<String, TargetStats>,
}

impl TelemetrySnapshot {
    pub fn target(&self, target: &str) -> Option<&TargetStats> {
        self.targets.get(target)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetStats {
    pub entered: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_elapsed_micros: u64,
    pub avg_elapsed_micros: f64,
    pub max_elapsed_micros: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    for event in events {
        let stats = snap.targets.entry(event.target().to_string()).or_default();
        match event {
            TelemetryEvent::Entering { .. } => {
                stats.entered += 1;
                snap.calls += 1;
            }
            TelemetryEvent::Exiting { elapsed_micros, .. } => {
                stats.completed += 1;
                stats.total_elapsed_micros += elapsed_micros;
                stats.max_elapsed_micros = stats.max_elapsed_micros.max(*elapsed_micros);
            }
            TelemetryEvent::Failed { elapsed_micros, .. } => {
                stats.failed += 1;
                stats.total_elapsed_micros += elapsed_micros;
                stats.max_elapsed_micros = stats.max_elapsed_micros.max(*elapsed_micros);
                snap.failures += 1;
            }
        }
    }

    // Averages over finished calls
    for stats in snap.targets.values_mut() {
        let finished = stats.completed + stats.failed;
        if finished > 0 {
            stats.avg_elapsed_micros = stats.total_elapsed_micros as f64 / finished as f64;
        }
    }

    snap
}
