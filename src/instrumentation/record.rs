use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, Weak};

use crate::config::{record_key, RECORD_PREFIX};
use crate::instruments::{same_instrument, InstrumentConfig, InstrumentRef, Target};
use crate::model::{read_lock, write_lock, Callable, ClassRef, Delegator, Member};

/// How a record's composed callable is published back onto its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberShape {
    Method,
    Property,
    Delegator { delegate: String, capability: String },
}

impl MemberShape {
    /// The member to install for `callable` in this shape.
    pub fn rebuild(&self, callable: Callable) -> Member {
        match self {
            MemberShape::Method => Member::Method(callable),
            MemberShape::Property => Member::Property(callable),
            MemberShape::Delegator {
                delegate,
                capability,
            } => Member::Delegator(Delegator {
                delegate: delegate.clone(),
                capability: capability.clone(),
                inner: Some(callable),
            }),
        }
    }
}

/// One applied `(instrument, config)` layer.
#[derive(Clone)]
pub struct Applied {
    pub instrument: InstrumentRef,
    pub config: InstrumentConfig,
}

impl fmt::Debug for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applied")
            .field("instrument", &self.instrument.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Another name of the same owner that resolved to the very same callable
/// and therefore publishes this record's wrapper too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub inherited: bool,
}

/// Wrapper chain of a single callable.
///
/// Layers compose innermost-first: the first instrument added sits closest
/// to `original`, the last added runs first and returns last.
#[derive(Clone)]
pub struct MethodInstrumentation {
    target: Target,
    original: Callable,
    composed: Callable,
    applied: Vec<Applied>,
    shape: MemberShape,
    inherited: bool,
    owner_class: Option<Weak<crate::model::Class>>,
    aliases: Vec<Alias>,
}

impl MethodInstrumentation {
    pub fn new(target: Target, original: Callable) -> Self {
        Self {
            target,
            composed: original.clone(),
            original,
            applied: Vec::new(),
            shape: MemberShape::Method,
            inherited: false,
            owner_class: None,
            aliases: Vec::new(),
        }
    }

    /// Record attached to `owner`. `inherited` marks a callable that was
    /// resolved from an ancestor, so full removal drops the override.
    pub fn for_class(
        target: Target,
        original: Callable,
        shape: MemberShape,
        owner: &ClassRef,
        inherited: bool,
    ) -> Self {
        Self {
            shape,
            inherited,
            owner_class: Some(std::sync::Arc::downgrade(owner)),
            ..Self::new(target, original)
        }
    }

    /// Record for an instance; `inherited` marks a callable that came from
    /// the class rather than an existing instance override.
    pub fn for_instance(target: Target, original: Callable, shape: MemberShape, inherited: bool) -> Self {
        Self {
            shape,
            inherited,
            ..Self::new(target, original)
        }
    }

    /// Appends the layer unless the exact pair is already applied.
    /// Returns whether anything changed.
    pub fn add(&mut self, instrument: &InstrumentRef, config: &InstrumentConfig) -> bool {
        if self.contains(instrument, config) {
            return false;
        }
        self.applied.push(Applied {
            instrument: InstrumentRef::clone(instrument),
            config: config.clone(),
        });
        self.recompose();
        true
    }

    /// Drops every layer of `instrument`, whatever its config. Returns the
    /// number of layers removed.
    pub fn remove(&mut self, instrument: &InstrumentRef) -> usize {
        let before = self.applied.len();
        self.applied
            .retain(|applied| !same_instrument(&applied.instrument, instrument));
        let removed = before - self.applied.len();
        if removed > 0 {
            self.recompose();
        }
        removed
    }

    pub fn contains(&self, instrument: &InstrumentRef, config: &InstrumentConfig) -> bool {
        self.applied
            .iter()
            .any(|a| same_instrument(&a.instrument, instrument) && &a.config == config)
    }

    pub fn contains_instrument(&self, instrument: &InstrumentRef) -> bool {
        self.applied
            .iter()
            .any(|a| same_instrument(&a.instrument, instrument))
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn applied(&self) -> &[Applied] {
        &self.applied
    }

    pub fn original(&self) -> &Callable {
        &self.original
    }

    pub fn composed(&self) -> &Callable {
        &self.composed
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn shape(&self) -> &MemberShape {
        &self.shape
    }

    pub fn inherited(&self) -> bool {
        self.inherited
    }

    pub fn owner_class(&self) -> Option<ClassRef> {
        self.owner_class.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_owned_by(&self, class: &ClassRef) -> bool {
        self.owner_class
            .as_ref()
            .is_some_and(|owner| std::ptr::eq(owner.as_ptr(), std::sync::Arc::as_ptr(class)))
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn add_alias(&mut self, name: &str, inherited: bool) {
        if name != self.target.method && !self.aliases.iter().any(|a| a.name == name) {
            self.aliases.push(Alias {
                name: name.to_string(),
                inherited,
            });
        }
    }

    /// The primary name followed by every alias.
    pub fn names(&self) -> Vec<(String, bool)> {
        std::iter::once((self.target.method.clone(), self.inherited))
            .chain(self.aliases.iter().map(|a| (a.name.clone(), a.inherited)))
            .collect()
    }

    fn recompose(&mut self) {
        let mut composed = self.original.clone();
        for applied in &self.applied {
            composed = applied
                .instrument
                .wrap(&self.target, composed, &applied.config);
        }
        self.composed = composed;
    }
}

impl fmt::Debug for MethodInstrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInstrumentation")
            .field("target", &self.target)
            .field("applied", &self.applied)
            .field("shape", &self.shape)
            .field("inherited", &self.inherited)
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// Records owned by one object or class, keyed by `record_key(method)`.
#[derive(Default)]
pub struct Bookkeeping {
    records: RwLock<BTreeMap<String, MethodInstrumentation>>,
}

impl Bookkeeping {
    /// Detach the record so it can be updated without holding the lock
    /// while instruments run.
    pub fn take(&self, method: &str) -> Option<MethodInstrumentation> {
        write_lock(&self.records).remove(&record_key(method))
    }

    pub fn put(&self, record: MethodInstrumentation) {
        let key = record_key(&record.target.method);
        write_lock(&self.records).insert(key, record);
    }

    pub fn get(&self, method: &str) -> Option<MethodInstrumentation> {
        read_lock(&self.records).get(&record_key(method)).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        read_lock(&self.records).contains_key(&record_key(method))
    }

    /// Name of the record publishing `name`: itself, or the record that
    /// carries it as an alias.
    pub fn primary_for(&self, name: &str) -> Option<String> {
        let records = read_lock(&self.records);
        if records.contains_key(&record_key(name)) {
            return Some(name.to_string());
        }
        records
            .values()
            .find(|r| r.aliases.iter().any(|a| a.name == name))
            .map(|r| r.target.method.clone())
    }

    /// The record publishing `name`, following aliases.
    pub fn lookup(&self, name: &str) -> Option<MethodInstrumentation> {
        self.primary_for(name).and_then(|primary| self.get(&primary))
    }

    /// Whether the record publishing `name` already has this exact layer.
    pub fn has_layer(&self, name: &str, instrument: &InstrumentRef, config: &InstrumentConfig) -> bool {
        self.lookup(name)
            .is_some_and(|record| record.contains(instrument, config))
    }

    /// Methods with a record, bookkeeping prefix stripped.
    pub fn methods(&self) -> Vec<String> {
        read_lock(&self.records)
            .keys()
            .filter_map(|key| key.strip_prefix(RECORD_PREFIX))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.records).is_empty()
    }
}
