use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::callable::{CallResult, Callable};
use super::object::ObjectRef;
use super::value::Value;
use super::{read_lock, write_lock};
use crate::error::CallError;
use crate::instrumentation::record::{Bookkeeping, MethodInstrumentation};

pub type ClassRef = Arc<Class>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(Uuid);

/// Method that forwards only when the object stored under `delegate`
/// itself has a method named `capability`.
#[derive(Debug, Clone)]
pub struct Delegator {
    pub delegate: String,
    pub capability: String,
    /// Local body run once the check passes. `None` forwards the call to the
    /// delegate's `capability` method.
    pub inner: Option<Callable>,
}

impl Delegator {
    pub fn is_available(&self, this: &ObjectRef) -> bool {
        self.delegate_of(this).is_some()
    }

    fn delegate_of(&self, this: &ObjectRef) -> Option<ObjectRef> {
        match this.attr(&self.delegate) {
            Some(Value::Object(delegate)) if delegate.has_method(&self.capability) => Some(delegate),
            _ => None,
        }
    }

    pub fn invoke(&self, this: &ObjectRef, name: &str, args: &[Value]) -> CallResult {
        let delegate = self.delegate_of(this).ok_or_else(|| CallError::MissingAttribute {
            class: this.class().name().to_string(),
            name: name.to_string(),
        })?;
        match &self.inner {
            Some(inner) => inner.call(this, args),
            None => delegate.call(&self.capability, args),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Member {
    Method(Callable),
    /// Computed attribute; the getter is called with no arguments.
    Property(Callable),
    Delegator(Delegator),
}

/// A type definition in a linear inheritance chain.
pub struct Class {
    id: ClassId,
    name: String,
    module: String,
    parent: Option<ClassRef>,
    instrumentable: bool,
    members: RwLock<BTreeMap<String, Member>>,
    records: Bookkeeping,
}

impl Class {
    pub fn builder(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_string(),
            module: String::new(),
            parent: None,
            instrumentable: false,
            members: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// `module.Name`, or just the name for classes outside any module.
    pub fn path(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }

    pub fn parent(&self) -> Option<&ClassRef> {
        self.parent.as_ref()
    }

    /// Carries the instrumentable marker itself or inherits it.
    pub fn is_instrumentable(&self) -> bool {
        self.instrumentable || self.parent.as_ref().is_some_and(|p| p.is_instrumentable())
    }

    /// The class followed by its ancestors, nearest first.
    pub fn ancestry(self: &Arc<Self>) -> Vec<ClassRef> {
        let mut chain = vec![Arc::clone(self)];
        let mut current = self.parent.clone();
        while let Some(class) = current {
            current = class.parent.clone();
            chain.push(class);
        }
        chain
    }

    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |p| p.depth() + 1)
    }

    pub fn is_subclass_of(self: &Arc<Self>, other: &ClassRef) -> bool {
        self.ancestry().iter().any(|c| Arc::ptr_eq(c, other))
    }

    /// Member declared on this very class, ignoring ancestors.
    pub fn declared(&self, name: &str) -> Option<Member> {
        read_lock(&self.members).get(name).cloned()
    }

    pub fn declares(&self, name: &str) -> bool {
        read_lock(&self.members).contains_key(name)
    }

    pub fn declared_names(&self) -> Vec<String> {
        read_lock(&self.members).keys().cloned().collect()
    }

    /// Nearest class in the chain declaring `name`, with that member.
    pub fn resolve(self: &Arc<Self>, name: &str) -> Option<(ClassRef, Member)> {
        self.ancestry()
            .into_iter()
            .find_map(|class| class.declared(name).map(|member| (class, member)))
    }

    pub fn set_member(&self, name: &str, member: Member) {
        write_lock(&self.members).insert(name.to_string(), member);
    }

    pub fn remove_member(&self, name: &str) -> Option<Member> {
        write_lock(&self.members).remove(name)
    }

    /// Instrumentation record publishing `name` on this class, if any.
    pub fn instrumentation(&self, name: &str) -> Option<MethodInstrumentation> {
        self.records.lookup(name)
    }

    pub fn instrumented_methods(&self) -> Vec<String> {
        self.records.methods()
    }

    pub(crate) fn records(&self) -> &Bookkeeping {
        &self.records
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("path", &self.path())
            .field("parent", &self.parent.as_ref().map(|p| p.path()))
            .field("members", &self.declared_names())
            .finish()
    }
}

pub struct ClassBuilder {
    name: String,
    module: String,
    parent: Option<ClassRef>,
    instrumentable: bool,
    members: BTreeMap<String, Member>,
}

impl ClassBuilder {
    pub fn module(mut self, module: &str) -> Self {
        self.module = module.to_string();
        self
    }

    pub fn parent(mut self, parent: &ClassRef) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Mark the class as eligible for instrumentation.
    pub fn instrumentable(mut self) -> Self {
        self.instrumentable = true;
        self
    }

    pub fn method<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        self.member(name, Member::Method(Callable::new(func)))
    }

    pub fn property<F>(self, name: &str, getter: F) -> Self
    where
        F: Fn(&ObjectRef) -> CallResult + Send + Sync + 'static,
    {
        self.member(
            name,
            Member::Property(Callable::new(move |this, _args| getter(this))),
        )
    }

    /// Delegator whose capability check uses the method's own name.
    pub fn delegator<F>(self, name: &str, delegate: &str, func: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        let delegator = Delegator {
            delegate: delegate.to_string(),
            capability: name.to_string(),
            inner: Some(Callable::new(func)),
        };
        self.member(name, Member::Delegator(delegator))
    }

    /// Delegator with no body of its own.
    pub fn forwarding(self, name: &str, delegate: &str) -> Self {
        let delegator = Delegator {
            delegate: delegate.to_string(),
            capability: name.to_string(),
            inner: None,
        };
        self.member(name, Member::Delegator(delegator))
    }

    pub fn member(mut self, name: &str, member: Member) -> Self {
        self.members.insert(name.to_string(), member);
        self
    }

    pub fn build(self) -> ClassRef {
        Arc::new(Class {
            id: ClassId(Uuid::new_v4()),
            name: self.name,
            module: self.module,
            parent: self.parent,
            instrumentable: self.instrumentable,
            members: RwLock::new(self.members),
            records: Bookkeeping::default(),
        })
    }
}
