//! Runtime instrumentation of machine-learning estimator graphs.
//!
//! An `Instrumentor` wraps configured methods of objects, classes or whole
//! packages with an `Instrument`, keeps a reversible record per wrapped
//! callable and restores the originals on request.

pub mod config;
pub mod error;
pub mod instrumentation;
pub mod instruments;
pub mod model;
pub mod telemetry;
pub mod testing;

pub use config::{ExcludeSet, InstrumentorSettings};
pub use error::{AccessError, CallError, InstrumentError, ModelError};
pub use instrumentation::{DiscoveryService, GraphWalker, Instrumentor, MethodInstrumentation, Namespace};
pub use instruments::{Instrument, InstrumentConfig, InstrumentRef, Target};
pub use model::{Callable, Class, ClassRef, Object, ObjectRef, Value};
