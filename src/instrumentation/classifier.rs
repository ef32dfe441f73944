use std::sync::Arc;

use super::record::{MemberShape, MethodInstrumentation};
use crate::error::{CallError, InstrumentError};
use crate::model::{Callable, ClassRef, Member, ObjectRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Plain,
    Property,
    Delegator,
}

/// What `name` resolves to on a class and where it was declared.
#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: CallableKind,
    pub member: Member,
    pub defining_class: ClassRef,
    /// Declared on an ancestor rather than on the inspected class.
    pub inherited: bool,
}

impl Classification {
    pub fn shape(&self) -> MemberShape {
        match &self.member {
            Member::Method(_) => MemberShape::Method,
            Member::Property(_) => MemberShape::Property,
            Member::Delegator(d) => MemberShape::Delegator {
                delegate: d.delegate.clone(),
                capability: d.capability.clone(),
            },
        }
    }

    /// The function an instrument actually wraps: the method itself, the
    /// property getter, or the body nested inside a delegator.
    pub fn wrappable(&self, owner: &str, method: &str) -> Result<Callable, InstrumentError> {
        match &self.member {
            Member::Method(callable) | Member::Property(callable) => Ok(callable.clone()),
            Member::Delegator(delegator) => {
                delegator
                    .inner
                    .clone()
                    .ok_or_else(|| InstrumentError::AmbiguousDelegate {
                        owner: owner.to_string(),
                        method: method.to_string(),
                    })
            }
        }
    }
}

pub fn classify(class: &ClassRef, method: &str) -> Result<Classification, InstrumentError> {
    let (defining_class, member) =
        class
            .resolve(method)
            .ok_or_else(|| InstrumentError::UnresolvableCallable {
                owner: class.path(),
                method: method.to_string(),
            })?;
    let kind = match &member {
        Member::Method(_) => CallableKind::Plain,
        Member::Property(_) => CallableKind::Property,
        Member::Delegator(_) => CallableKind::Delegator,
    };
    Ok(Classification {
        kind,
        inherited: !Arc::ptr_eq(&defining_class, class),
        member,
        defining_class,
    })
}

/// Every class in the chain that declares `method`, nearest first.
pub fn declaring_classes(class: &ClassRef, method: &str) -> Vec<ClassRef> {
    class
        .ancestry()
        .into_iter()
        .filter(|c| c.declares(method))
        .collect()
}

/// What an instance-level wrap would capture for `method`.
#[derive(Debug, Clone)]
pub enum InstanceCallable {
    /// Already replaced on this instance.
    Override(Callable),
    /// Resolved through the class. `resolved` is the function found there
    /// (absent for a forwarding delegator) and `shape` how to republish it.
    Class {
        resolved: Option<Callable>,
        shape: MemberShape,
    },
    /// Computed attribute; left alone on instances.
    Property,
}

pub fn classify_instance(obj: &ObjectRef, method: &str) -> Result<InstanceCallable, InstrumentError> {
    if let Some(Member::Method(callable)) = obj.override_member(method) {
        return Ok(InstanceCallable::Override(callable));
    }
    let classification = classify(obj.class(), method)?;
    let shape = classification.shape();
    match classification.member {
        Member::Method(callable) => Ok(InstanceCallable::Class {
            resolved: Some(callable),
            shape,
        }),
        Member::Property(_) => Ok(InstanceCallable::Property),
        Member::Delegator(delegator) => {
            if !delegator.is_available(obj) {
                // absent until the delegate supports it
                return Err(InstrumentError::UnresolvableCallable {
                    owner: obj.class().path(),
                    method: method.to_string(),
                });
            }
            Ok(InstanceCallable::Class {
                resolved: delegator.inner,
                shape,
            })
        }
    }
}

/// Callable that looks `method` up through `class` on every call.
///
/// Overrides built over an inherited member wrap this instead of the member
/// itself, so layers later added to or removed from the class chain apply
/// underneath them. An already-checked delegator runs its body directly.
pub fn late_bound(class: &ClassRef, method: &str) -> Callable {
    let class = Arc::clone(class);
    let name = method.to_string();
    Callable::new(move |this, args| match class.resolve(&name) {
        Some((_, Member::Method(callable) | Member::Property(callable))) => callable.call(this, args),
        Some((_, Member::Delegator(delegator))) => match &delegator.inner {
            Some(inner) => inner.call(this, args),
            None => delegator.invoke(this, &name, args),
        },
        None => Err(CallError::MissingAttribute {
            class: class.name().to_string(),
            name: name.clone(),
        }),
    })
}

/// Whether calling `method` through `class` already runs a class-level
/// layer accepted by `matches`. Follows late-bound overrides up the chain
/// and stops at the first member that replaces the inherited one.
pub fn class_chain_has_layer<F>(class: &ClassRef, method: &str, matches: F) -> bool
where
    F: Fn(&MethodInstrumentation) -> bool,
{
    for owner in class.ancestry() {
        if !owner.declares(method) {
            continue;
        }
        let Some(record) = owner.instrumentation(method) else {
            return false;
        };
        if matches(&record) {
            return true;
        }
        let inherited = record
            .names()
            .into_iter()
            .any(|(name, inherited)| name == method && inherited);
        if !inherited {
            return false;
        }
    }
    false
}
