use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::callable::{CallResult, Callable};
use super::class::{ClassRef, Member};
use super::value::Value;
use super::{read_lock, write_lock};
use crate::config::is_reserved;
use crate::error::{AccessError, CallError, ModelError};
use crate::instrumentation::record::{Bookkeeping, MethodInstrumentation};

pub type ObjectRef = Arc<Object>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An instance of a `Class`. Identity is the `Arc` itself.
pub struct Object {
    id: ObjectId,
    class: ClassRef,
    attrs: RwLock<BTreeMap<String, Value>>,
    overrides: RwLock<BTreeMap<String, Member>>,
    records: Bookkeeping,
}

impl Object {
    pub fn new(class: &ClassRef) -> ObjectRef {
        Arc::new(Object {
            id: ObjectId(Uuid::new_v4()),
            class: Arc::clone(class),
            attrs: RwLock::new(BTreeMap::new()),
            overrides: RwLock::new(BTreeMap::new()),
            records: Bookkeeping::default(),
        })
    }

    pub fn with_attrs<I, S>(class: &ClassRef, attrs: I) -> Result<ObjectRef, ModelError>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let obj = Object::new(class);
        for (name, value) in attrs {
            obj.set_attr(&name.into(), value)?;
        }
        Ok(obj)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn set_attr(&self, name: &str, value: Value) -> Result<(), ModelError> {
        if is_reserved(name) {
            return Err(ModelError::ReservedName(name.to_string()));
        }
        write_lock(&self.attrs).insert(name.to_string(), value);
        Ok(())
    }

    pub fn attr(&self, name: &str) -> Option<Value> {
        read_lock(&self.attrs).get(name).cloned()
    }

    /// Attribute values in name order, bookkeeping excluded. Fails when the
    /// attribute table was poisoned by a panicking writer.
    pub fn attrs(&self) -> Result<Vec<(String, Value)>, AccessError> {
        let attrs = self
            .attrs
            .read()
            .map_err(|_| AccessError::new(self.to_string(), "attribute table poisoned"))?;
        Ok(attrs
            .iter()
            .filter(|(name, _)| !is_reserved(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }

    /// Replace `name` for this instance only.
    pub fn set_override(&self, name: &str, callable: Callable) {
        self.set_override_member(name, Member::Method(callable));
    }

    /// Replace `name` for this instance with a member of any shape, so a
    /// delegator keeps its capability check.
    pub fn set_override_member(&self, name: &str, member: Member) {
        write_lock(&self.overrides).insert(name.to_string(), member);
    }

    pub fn remove_override(&self, name: &str) -> Option<Member> {
        write_lock(&self.overrides).remove(name)
    }

    pub fn override_member(&self, name: &str) -> Option<Member> {
        read_lock(&self.overrides).get(name).cloned()
    }

    /// The callable this instance publishes for `name`: the override itself,
    /// or the body of an overriding delegator.
    pub fn override_of(&self, name: &str) -> Option<Callable> {
        match self.override_member(name)? {
            Member::Method(callable) | Member::Property(callable) => Some(callable),
            Member::Delegator(delegator) => delegator.inner,
        }
    }

    /// The plain callable `call(name)` would run: the instance override, or
    /// the class method. Properties and delegators yield `None`.
    pub fn method(&self, name: &str) -> Option<Callable> {
        if let Some(member) = self.override_member(name) {
            return match member {
                Member::Method(callable) => Some(callable),
                _ => None,
            };
        }
        match self.class.resolve(name) {
            Some((_, Member::Method(callable))) => Some(callable),
            _ => None,
        }
    }

    /// Whether `call(name)` would find something to run.
    pub fn has_method(self: &Arc<Self>, name: &str) -> bool {
        match self.member(name) {
            Some(Member::Method(_)) => true,
            Some(Member::Delegator(delegator)) => delegator.is_available(self),
            _ => false,
        }
    }

    pub fn call(self: &Arc<Self>, name: &str, args: &[Value]) -> CallResult {
        match self.member(name) {
            Some(Member::Method(callable)) => callable.call(self, args),
            Some(Member::Delegator(delegator)) => delegator.invoke(self, name, args),
            Some(Member::Property(_)) => Err(CallError::NotCallable {
                class: self.class.name().to_string(),
                name: name.to_string(),
            }),
            None => Err(self.missing(name)),
        }
    }

    /// Read a property or a plain attribute.
    pub fn get(self: &Arc<Self>, name: &str) -> CallResult {
        if let Some(Member::Property(getter)) = self.class.resolve(name).map(|(_, m)| m) {
            return getter.call(self, &[]);
        }
        self.attr(name).ok_or_else(|| self.missing(name))
    }

    /// Instrumentation record publishing `method` on this instance, if any.
    pub fn instrumentation(&self, method: &str) -> Option<MethodInstrumentation> {
        self.records.lookup(method)
    }

    pub fn instrumented_methods(&self) -> Vec<String> {
        self.records.methods()
    }

    pub(crate) fn records(&self) -> &Bookkeeping {
        &self.records
    }

    /// What `name` means on this instance: its override, else the class member.
    fn member(&self, name: &str) -> Option<Member> {
        self.override_member(name)
            .or_else(|| self.class.resolve(name).map(|(_, member)| member))
    }

    fn missing(&self, name: &str) -> CallError {
        CallError::MissingAttribute {
            class: self.class.name().to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.class.path(), self.id)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.path())
            .field("id", &self.id)
            .finish()
    }
}
