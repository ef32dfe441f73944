//! Dynamic object model the engine instruments.
//!
//! Classes declare members and form a linear inheritance chain; objects
//! carry attributes and per-instance overrides. Both own a bookkeeping
//! table of instrumentation records, so the model never needs open classes
//! or attribute injection.

pub mod callable;
pub mod class;
pub mod object;
pub mod value;

pub use callable::*;
pub use class::*;
pub use object::*;
pub use value::*;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Member and override tables stay usable after a panicking writer; only
// attribute enumeration reports poisoning, as a traversal error.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
