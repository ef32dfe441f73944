//! Instruments: factories that wrap a callable in a replacement with the
//! same calling convention.

pub mod base;
pub mod compose;
pub mod logging;
pub mod recorder;

pub use base::*;
pub use compose::Composed;
pub use logging::{Identity, ShapeLogger, TimeElapsedLogger};
pub use recorder::CallRecorder;
