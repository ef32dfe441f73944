//! Wrapping engine: per-callable records, callable classification, graph
//! traversal, the instrumentor and package discovery.

pub mod classifier;
pub mod discovery;
pub mod instrumentor;
pub mod record;
pub mod walker;

pub use classifier::{
    class_chain_has_layer, classify, classify_instance, late_bound, CallableKind, Classification,
    InstanceCallable,
};
pub use discovery::{Discovery, DiscoveryService, Module, Namespace};
pub use instrumentor::Instrumentor;
pub use record::{Alias, Applied, Bookkeeping, MemberShape, MethodInstrumentation};
pub use walker::{GraphWalker, WalkReport};
