use std::time::Instant;
use tracing::info;

use super::base::{Instrument, InstrumentConfig, Target};
use crate::model::{Callable, Value};

/// Name used in log lines: the `label` config entry, else `Owner.method`.
fn label(target: &Target, config: &InstrumentConfig) -> String {
    config
        .str("label")
        .map(str::to_string)
        .unwrap_or_else(|| target.to_string())
}

/// Returns the wrapped callable unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Instrument for Identity {
    fn wrap(&self, _target: &Target, method: Callable, _config: &InstrumentConfig) -> Callable {
        method
    }

    fn name(&self) -> &str {
        "Identity"
    }
}

/// Logs when a call starts and how long it took.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeElapsedLogger;

impl Instrument for TimeElapsedLogger {
    fn wrap(&self, target: &Target, method: Callable, config: &InstrumentConfig) -> Callable {
        let name = label(target, config);
        Callable::new(move |this, args| {
            info!("{} starting.", name);
            let start = Instant::now();
            let result = method.call(this, args);
            info!(
                "{} elapsed time: {:.6} seconds",
                name,
                start.elapsed().as_secs_f64()
            );
            result
        })
    }

    fn name(&self) -> &str {
        "TimeElapsedLogger"
    }
}

/// Logs the length of the first argument and of the returned value when
/// they are buffers or lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShapeLogger;

fn shape(value: &Value) -> Option<usize> {
    match value {
        Value::Buffer(data) => Some(data.len()),
        Value::List(items) => Some(items.len()),
        _ => None,
    }
}

impl Instrument for ShapeLogger {
    fn wrap(&self, target: &Target, method: Callable, config: &InstrumentConfig) -> Callable {
        let name = label(target, config);
        Callable::new(move |this, args| {
            if let Some(len) = args.first().and_then(shape) {
                info!("{} input X shape: ({},)", name, len);
            }
            let result = method.call(this, args);
            if let Some(len) = result.as_ref().ok().and_then(shape) {
                info!("{} output X shape: ({},)", name, len);
            }
            result
        })
    }

    fn name(&self) -> &str {
        "ShapeLogger"
    }
}
