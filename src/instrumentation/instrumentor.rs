use tracing::{debug, info};

use super::classifier::{
    class_chain_has_layer, classify, classify_instance, declaring_classes, late_bound, InstanceCallable,
};
use super::discovery::{Discovery, DiscoveryService, Namespace};
use super::record::{MemberShape, MethodInstrumentation};
use super::walker::{GraphWalker, WalkReport};
use crate::config::{ExcludeSet, InstrumentorSettings};
use crate::error::InstrumentError;
use crate::instruments::{InstrumentConfig, InstrumentRef, Scope, Target};
use crate::model::{Callable, ClassRef, ObjectRef, Value};

/// Binds one instrument and its configuration to instances, classes and
/// packages.
///
/// Applying the same instrument with an equal config twice is a no-op.
/// Removal is keyed by the instrument alone, so a partial uninstrument
/// drops this instrumentor's layers and leaves every other layer in place.
pub struct Instrumentor {
    instrument: InstrumentRef,
    config: InstrumentConfig,
    methods: Vec<String>,
    exclude: ExcludeSet,
}

/// Callables wrapped on one owner during a single pass. A later name that
/// resolves to one of them becomes an alias instead of a second record.
#[derive(Default)]
struct OwnerPass {
    wrapped: Vec<(Callable, MemberShape, String)>,
}

impl OwnerPass {
    fn alias_of(&self, callable: &Callable, shape: &MemberShape) -> Option<String> {
        self.wrapped
            .iter()
            .find(|(c, s, _)| c.same(callable) && s == shape)
            .map(|(_, _, method)| method.clone())
    }

    fn remember(&mut self, callable: Callable, shape: MemberShape, method: &str) {
        self.wrapped.push((callable, shape, method.to_string()));
    }
}

impl Instrumentor {
    /// Instrumentor with the default method set and exclusions.
    pub fn new(instrument: InstrumentRef) -> Self {
        let settings = InstrumentorSettings::default();
        Self {
            instrument,
            config: settings.config,
            exclude: ExcludeSet::new(settings.exclude),
            methods: settings.methods,
        }
    }

    pub fn with_settings(
        instrument: InstrumentRef,
        settings: InstrumentorSettings,
    ) -> Result<Self, InstrumentError> {
        settings.validate()?;
        Ok(Self {
            instrument,
            config: settings.config,
            exclude: ExcludeSet::new(settings.exclude),
            methods: settings.methods,
        })
    }

    pub fn instrument(&self) -> &InstrumentRef {
        &self.instrument
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn exclude(&self) -> &ExcludeSet {
        &self.exclude
    }

    // region: instances

    /// Wrap the configured methods of `obj`, and with `recursive` of every
    /// instrumentable object reachable from it. `config` replaces the
    /// instrumentor's own config for this call.
    pub fn instrument_instance(
        &self,
        obj: &ObjectRef,
        config: Option<&InstrumentConfig>,
        recursive: bool,
    ) -> Result<WalkReport, InstrumentError> {
        self.instrument_graph(&Value::from(obj), config, recursive)
    }

    /// `instrument_instance` for an arbitrary root value, such as a list of
    /// estimators.
    pub fn instrument_graph(
        &self,
        root: &Value,
        config: Option<&InstrumentConfig>,
        recursive: bool,
    ) -> Result<WalkReport, InstrumentError> {
        let config = config.unwrap_or(&self.config);
        let report = GraphWalker::new(&self.exclude, recursive)
            .walk(root, |obj| self.instrument_object(obj, config))?;
        info!(
            visited = report.visited,
            excluded = report.excluded,
            skipped = report.skipped,
            "Instrumented instances with {}",
            self.instrument.name()
        );
        Ok(report)
    }

    /// Remove this instrumentor's layers from `obj` (and its graph). With
    /// `full`, every record is dropped and every original restored,
    /// whichever instrumentor added it.
    pub fn uninstrument_instance(
        &self,
        obj: &ObjectRef,
        full: bool,
        recursive: bool,
    ) -> Result<WalkReport, InstrumentError> {
        self.uninstrument_graph(&Value::from(obj), full, recursive)
    }

    pub fn uninstrument_graph(
        &self,
        root: &Value,
        full: bool,
        recursive: bool,
    ) -> Result<WalkReport, InstrumentError> {
        let report = GraphWalker::new(&self.exclude, recursive).walk(root, |obj| {
            self.uninstrument_object(obj, full);
            Ok(())
        })?;
        info!(
            visited = report.visited,
            full,
            "Uninstrumented instances with {}",
            self.instrument.name()
        );
        Ok(report)
    }

    fn instrument_object(
        &self,
        obj: &ObjectRef,
        config: &InstrumentConfig,
    ) -> Result<(), InstrumentError> {
        let mut pass = OwnerPass::default();
        for method in &self.methods {
            self.instrument_object_method(obj, method, config, &mut pass)?;
        }
        Ok(())
    }

    fn instrument_object_method(
        &self,
        obj: &ObjectRef,
        method: &str,
        config: &InstrumentConfig,
        pass: &mut OwnerPass,
    ) -> Result<(), InstrumentError> {
        let records = obj.records();
        if let Some(primary) = records.primary_for(method) {
            if let Some(mut record) = records.take(&primary) {
                let through_class = record.inherited()
                    && class_chain_has_layer(obj.class(), method, |r| r.contains(&self.instrument, config));
                if !through_class && record.add(&self.instrument, config) {
                    publish_instance(obj, &record);
                }
                records.put(record);
            }
            return Ok(());
        }

        let (original, resolved, shape, inherited) = match classify_instance(obj, method) {
            Ok(InstanceCallable::Override(callable)) => {
                (callable.clone(), Some(callable), MemberShape::Method, false)
            }
            Ok(InstanceCallable::Class { resolved, shape }) => {
                if class_chain_has_layer(obj.class(), method, |r| r.contains(&self.instrument, config)) {
                    debug!(
                        "Already instrumented through the class: {}.{}",
                        obj.class().path(),
                        method
                    );
                    return Ok(());
                }
                (late_bound(obj.class(), method), resolved, shape, true)
            }
            Ok(InstanceCallable::Property) => {
                debug!(
                    "Not instrumenting property on instance of: {}.{}",
                    obj.class().path(),
                    method
                );
                return Ok(());
            }
            Err(InstrumentError::UnresolvableCallable { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };

        if let Some(primary) = resolved.as_ref().and_then(|r| pass.alias_of(r, &shape)) {
            if let Some(mut record) = records.take(&primary) {
                record.add_alias(method, inherited);
                publish_instance(obj, &record);
                records.put(record);
            }
            return Ok(());
        }

        let target = Target::new(obj.class().path(), method, Scope::Instance(obj.id()));
        let mut record = MethodInstrumentation::for_instance(target, original, shape.clone(), inherited);
        record.add(&self.instrument, config);
        publish_instance(obj, &record);
        records.put(record);
        if let Some(resolved) = resolved {
            pass.remember(resolved, shape, method);
        }
        Ok(())
    }

    fn uninstrument_object(&self, obj: &ObjectRef, full: bool) {
        let methods = if full {
            obj.records().methods()
        } else {
            self.methods.clone()
        };
        for method in methods {
            self.uninstrument_object_method(obj, &method, full);
        }
    }

    fn uninstrument_object_method(&self, obj: &ObjectRef, method: &str, full: bool) {
        let records = obj.records();
        let Some(mut record) = records.primary_for(method).and_then(|p| records.take(&p)) else {
            return;
        };
        record.remove(&self.instrument);
        if full || record.is_empty() {
            restore_instance(obj, &record);
        } else {
            publish_instance(obj, &record);
            records.put(record);
        }
    }

    // endregion

    // region: classes

    /// Classes reachable from `obj`: the class of every instrumentable node
    /// plus each class of its chain declaring a configured method, with
    /// ancestors ordered first.
    pub fn collect_classes(&self, obj: &ObjectRef) -> Result<Vec<ClassRef>, InstrumentError> {
        let mut classes: Vec<ClassRef> = Vec::new();
        GraphWalker::new(&self.exclude, true).walk(&Value::from(obj), |node| {
            push_unique(&mut classes, node.class());
            for method in &self.methods {
                if node.has_method(method) {
                    for class in declaring_classes(node.class(), method) {
                        push_unique(&mut classes, &class);
                    }
                }
            }
            Ok(())
        })?;
        classes.sort_by_key(|class| class.depth());
        Ok(classes)
    }

    /// Instrument only the classes present in `obj`'s graph, instead of a
    /// whole package.
    pub fn instrument_instance_classes(
        &self,
        obj: &ObjectRef,
    ) -> Result<Vec<ClassRef>, InstrumentError> {
        let classes = self.collect_classes(obj)?;
        self.instrument_classes(&classes)?;
        info!("Instrumented {} classes found in {}", classes.len(), obj);
        Ok(classes)
    }

    pub fn uninstrument_instance_classes(
        &self,
        obj: &ObjectRef,
        full: bool,
    ) -> Result<Vec<ClassRef>, InstrumentError> {
        let classes = self.collect_classes(obj)?;
        self.uninstrument_classes(&classes, full)?;
        Ok(classes)
    }

    /// Ancestors are instrumented before their subclasses, so a subclass
    /// never stacks a layer it already inherits.
    pub fn instrument_classes<'c, I>(&self, classes: I) -> Result<(), InstrumentError>
    where
        I: IntoIterator<Item = &'c ClassRef>,
    {
        let mut classes: Vec<&ClassRef> = classes.into_iter().collect();
        classes.sort_by_key(|class| class.depth());
        for class in classes {
            self.instrument_class(class)?;
        }
        Ok(())
    }

    pub fn uninstrument_classes<'c, I>(&self, classes: I, full: bool) -> Result<(), InstrumentError>
    where
        I: IntoIterator<Item = &'c ClassRef>,
    {
        for class in classes {
            self.uninstrument_class(class, full)?;
        }
        Ok(())
    }

    /// Wrap the configured methods as seen from `class`. Inherited methods
    /// get a local override on `class`; the ancestor is left untouched.
    pub fn instrument_class(&self, class: &ClassRef) -> Result<(), InstrumentError> {
        if self.exclude.excludes(class) {
            debug!("Not instrumenting (excluded): {}", class.path());
            return Ok(());
        }
        if !class.is_instrumentable() {
            debug!("Not instrumenting (not instrumentable): {}", class.path());
            return Ok(());
        }
        debug!("Instrumenting: {}", class.path());
        let mut pass = OwnerPass::default();
        for method in &self.methods {
            self.instrument_class_method(class, method, &mut pass)?;
        }
        Ok(())
    }

    fn instrument_class_method(
        &self,
        class: &ClassRef,
        method: &str,
        pass: &mut OwnerPass,
    ) -> Result<(), InstrumentError> {
        let records = class.records();
        if let Some(primary) = records.primary_for(method) {
            if let Some(mut record) = records.take(&primary) {
                let through_parent = record.inherited()
                    && class.parent().is_some_and(|parent| {
                        class_chain_has_layer(parent, method, |r| r.contains(&self.instrument, &self.config))
                    });
                if !through_parent && record.add(&self.instrument, &self.config) {
                    publish_class(class, &record);
                }
                records.put(record);
            }
            return Ok(());
        }

        let classification = match classify(class, method) {
            Ok(classification) => classification,
            Err(InstrumentError::UnresolvableCallable { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };
        let resolved = classification.wrappable(&class.path(), method)?;
        let shape = classification.shape();

        if classification.inherited
            && class_chain_has_layer(class, method, |r| r.contains(&self.instrument, &self.config))
        {
            // the inherited callable already carries this layer
            debug!(
                "Already instrumented through {}: {}.{}",
                classification.defining_class.path(),
                class.path(),
                method
            );
            return Ok(());
        }

        if let Some(primary) = pass.alias_of(&resolved, &shape) {
            if let Some(mut record) = records.take(&primary) {
                record.add_alias(method, classification.inherited);
                publish_class(class, &record);
                records.put(record);
            }
            return Ok(());
        }

        // an inherited override keeps following the ancestor's member
        let original = match class.parent() {
            Some(parent) if classification.inherited => late_bound(parent, method),
            _ => resolved.clone(),
        };
        let target = Target::new(class.path(), method, Scope::Class);
        let mut record = MethodInstrumentation::for_class(
            target,
            original,
            shape.clone(),
            class,
            classification.inherited,
        );
        record.add(&self.instrument, &self.config);
        publish_class(class, &record);
        records.put(record);
        pass.remember(resolved, shape, method);
        Ok(())
    }

    /// Remove this instrumentor's layers from `class`. With `full`, every
    /// record on the class is dropped; overrides created for inherited
    /// methods are deleted so inheritance applies again.
    pub fn uninstrument_class(&self, class: &ClassRef, full: bool) -> Result<(), InstrumentError> {
        let methods = if full {
            class.records().methods()
        } else {
            self.methods.clone()
        };
        for method in methods {
            self.uninstrument_class_method(class, &method, full);
        }
        Ok(())
    }

    fn uninstrument_class_method(&self, class: &ClassRef, method: &str, full: bool) {
        let records = class.records();
        let Some(mut record) = records.primary_for(method).and_then(|p| records.take(&p)) else {
            return;
        };
        record.remove(&self.instrument);
        if full || record.is_empty() {
            restore_class(class, &record);
        } else {
            publish_class(class, &record);
            records.put(record);
        }
    }

    // endregion

    // region: packages

    pub fn instrument_package(
        &self,
        namespace: &Namespace,
        package: &str,
    ) -> Result<Discovery, InstrumentError> {
        let discovery = DiscoveryService::new(namespace).discover(package)?;
        self.instrument_classes(discovery.classes())?;
        info!(
            "Instrumented package {}: {} classes, {} modules failed to import",
            package,
            discovery.len(),
            discovery.failures.len()
        );
        Ok(discovery)
    }

    pub fn instrument_packages<I, S>(
        &self,
        namespace: &Namespace,
        packages: I,
    ) -> Result<Vec<Discovery>, InstrumentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        packages
            .into_iter()
            .map(|package| self.instrument_package(namespace, package.as_ref()))
            .collect()
    }

    pub fn uninstrument_package(
        &self,
        namespace: &Namespace,
        package: &str,
        full: bool,
    ) -> Result<Discovery, InstrumentError> {
        let discovery = DiscoveryService::new(namespace).discover(package)?;
        self.uninstrument_classes(discovery.classes(), full)?;
        Ok(discovery)
    }

    pub fn uninstrument_packages<I, S>(
        &self,
        namespace: &Namespace,
        packages: I,
        full: bool,
    ) -> Result<Vec<Discovery>, InstrumentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        packages
            .into_iter()
            .map(|package| self.uninstrument_package(namespace, package.as_ref(), full))
            .collect()
    }

    // endregion
}

fn publish_instance(obj: &ObjectRef, record: &MethodInstrumentation) {
    let member = record.shape().rebuild(record.composed().clone());
    for (name, _) in record.names() {
        obj.set_override_member(&name, member.clone());
    }
}

fn restore_instance(obj: &ObjectRef, record: &MethodInstrumentation) {
    for (name, inherited) in record.names() {
        if inherited {
            obj.remove_override(&name);
        } else {
            obj.set_override(&name, record.original().clone());
        }
    }
}

fn publish_class(class: &ClassRef, record: &MethodInstrumentation) {
    let member = record.shape().rebuild(record.composed().clone());
    for (name, _) in record.names() {
        class.set_member(&name, member.clone());
    }
}

fn restore_class(class: &ClassRef, record: &MethodInstrumentation) {
    for (name, inherited) in record.names() {
        if inherited {
            class.remove_member(&name);
        } else {
            class.set_member(&name, record.shape().rebuild(record.original().clone()));
        }
    }
}

fn push_unique(classes: &mut Vec<ClassRef>, class: &ClassRef) {
    if !classes.iter().any(|c| std::sync::Arc::ptr_eq(c, class)) {
        classes.push(std::sync::Arc::clone(class));
    }
}
