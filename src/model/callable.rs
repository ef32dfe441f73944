use std::fmt;
use std::sync::Arc;

use super::object::ObjectRef;
use super::value::Value;
use crate::error::CallError;

pub type CallResult = Result<Value, CallError>;

type Func = dyn Fn(&ObjectRef, &[Value]) -> CallResult + Send + Sync;

/// A shared function taking the receiver and positional arguments.
///
/// Clones share the same function; `same` compares that identity, which is
/// what "the original callable" means throughout the crate.
#[derive(Clone)]
pub struct Callable {
    func: Arc<Func>,
}

impl Callable {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    pub fn call(&self, this: &ObjectRef, args: &[Value]) -> CallResult {
        (self.func)(this, args)
    }

    pub fn same(&self, other: &Callable) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.func), Arc::as_ptr(&other.func))
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.func) as *const ()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({:p})", self.addr())
    }
}
