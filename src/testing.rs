//! Assertions over the instrumentation state an `Instrumentor` leaves
//! behind. Failures panic, so these helpers belong in tests.

use crate::error::InstrumentError;
use crate::instrumentation::{class_chain_has_layer, classify, Instrumentor, MethodInstrumentation, Namespace};
use crate::instrumentation::{DiscoveryService, GraphWalker};
use crate::model::{ClassRef, Member, ObjectRef, Value};

pub struct InstrumentationAsserter<'a> {
    instrumentor: &'a Instrumentor,
}

impl<'a> InstrumentationAsserter<'a> {
    pub fn new(instrumentor: &'a Instrumentor) -> Self {
        Self { instrumentor }
    }

    // region: instances

    /// Every reachable, non-excluded object carries this instrumentor's
    /// layer on each configured method it has. Excluded objects carry none.
    pub fn assert_instrumented_instance(&self, obj: &ObjectRef, recursive: bool) {
        self.walk(obj, recursive, |node, excluded| {
            if excluded {
                self.check_uninstrumented_object(node, false);
            } else {
                self.check_instrumented_object(node);
            }
        });
    }

    pub fn assert_uninstrumented_instance(&self, obj: &ObjectRef, recursive: bool, full: bool) {
        self.walk(obj, recursive, |node, _| self.check_uninstrumented_object(node, full));
    }

    fn walk<F>(&self, obj: &ObjectRef, recursive: bool, mut check: F)
    where
        F: FnMut(&ObjectRef, bool),
    {
        let walked = GraphWalker::new(self.instrumentor.exclude(), recursive).walk_marking_excluded(
            &Value::from(obj),
            |node, excluded| {
                check(node, excluded);
                Ok(())
            },
        );
        if let Err(err) = walked {
            panic!("walk of {obj} failed: {err}");
        }
    }

    fn check_instrumented_object(&self, obj: &ObjectRef) {
        for method in self.instrumentor.methods() {
            if is_property(obj.class(), method) {
                continue;
            }
            let record = obj.instrumentation(method);
            if obj.has_method(method) {
                let through_class = record.as_ref().map_or(true, |r| r.inherited())
                    && class_chain_has_layer(obj.class(), method, |r| {
                        r.contains_instrument(self.instrumentor.instrument())
                    });
                if through_class {
                    continue;
                }
                let record = record
                    .unwrap_or_else(|| panic!("{obj}.{method} has no instrumentation record"));
                assert!(
                    record.contains_instrument(self.instrumentor.instrument()),
                    "{obj}.{method} is missing the instrument"
                );
                let published = obj.override_of(method);
                assert!(
                    published.is_some_and(|c| c.same(record.composed())),
                    "{obj}.{method} does not publish its wrapper"
                );
            } else {
                assert!(record.is_none(), "{obj}.{method} has a record but no method");
            }
        }
    }

    fn check_uninstrumented_object(&self, obj: &ObjectRef, full: bool) {
        let mut methods = self.instrumentor.methods().to_vec();
        if full {
            methods.extend(obj.instrumented_methods());
        }
        for method in &methods {
            if is_property(obj.class(), method) {
                continue;
            }
            let record = obj.instrumentation(method);
            if full {
                assert!(record.is_none(), "{obj}.{method} still has a record");
            }
            if let Some(record) = record {
                self.check_without_layer(&record, &obj.to_string(), method);
            }
        }
    }

    // endregion

    // region: classes

    pub fn assert_instrumented_class(&self, class: &ClassRef) {
        if self.instrumentor.exclude().excludes(class) || !class.is_instrumentable() {
            return;
        }
        for method in self.instrumentor.methods() {
            self.check_instrumented_class_method(class, method);
        }
    }

    pub fn assert_instrumented_classes<'c, I>(&self, classes: I)
    where
        I: IntoIterator<Item = &'c ClassRef>,
    {
        for class in classes {
            self.assert_instrumented_class(class);
        }
    }

    pub fn assert_uninstrumented_class(&self, class: &ClassRef, full: bool) {
        if self.instrumentor.exclude().excludes(class) {
            return;
        }
        let mut methods = self.instrumentor.methods().to_vec();
        if full {
            methods.extend(class.instrumented_methods());
        }
        for method in &methods {
            let record = class.instrumentation(method);
            if full {
                assert!(record.is_none(), "{}.{method} still has a record", class.path());
            }
            if let Some(record) = record {
                self.check_without_layer(&record, &class.path(), method);
                assert!(
                    published_by(class, method).is_some_and(|c| c.same(record.composed())),
                    "{}.{method} does not publish its remaining layers",
                    class.path()
                );
            }
        }
    }

    pub fn assert_uninstrumented_classes<'c, I>(&self, classes: I, full: bool)
    where
        I: IntoIterator<Item = &'c ClassRef>,
    {
        for class in classes {
            self.assert_uninstrumented_class(class, full);
        }
    }

    fn check_instrumented_class_method(&self, class: &ClassRef, method: &str) {
        let classification = match classify(class, method) {
            Ok(classification) => classification,
            Err(InstrumentError::UnresolvableCallable { .. }) => return,
            Err(err) => panic!("cannot classify {}.{method}: {err}", class.path()),
        };
        let inherited = class
            .instrumentation(method)
            .map_or(classification.inherited, |r| r.inherited());
        let through_parent = class.parent().is_some_and(|parent| {
            class_chain_has_layer(parent, method, |r| {
                r.contains(self.instrumentor.instrument(), self.instrumentor.config())
            })
        });
        if inherited && through_parent {
            return;
        }
        let record = class
            .instrumentation(method)
            .unwrap_or_else(|| panic!("{}.{method} has no instrumentation record", class.path()));
        assert!(
            record.contains(self.instrumentor.instrument(), self.instrumentor.config()),
            "{}.{method} is missing the instrument or its config",
            class.path()
        );
        assert!(
            published_by(class, method).is_some_and(|c| c.same(record.composed())),
            "{}.{method} does not publish its wrapper",
            class.path()
        );
    }

    // endregion

    // region: packages

    pub fn assert_instrumented_package(&self, namespace: &Namespace, package: &str) {
        let discovery = DiscoveryService::new(namespace)
            .discover(package)
            .unwrap_or_else(|err| panic!("cannot discover {package}: {err}"));
        self.assert_instrumented_classes(discovery.classes());
    }

    pub fn assert_instrumented_packages(&self, namespace: &Namespace, packages: &[&str]) {
        for package in packages {
            self.assert_instrumented_package(namespace, package);
        }
    }

    pub fn assert_uninstrumented_package(&self, namespace: &Namespace, package: &str, full: bool) {
        let discovery = DiscoveryService::new(namespace)
            .discover(package)
            .unwrap_or_else(|err| panic!("cannot discover {package}: {err}"));
        self.assert_uninstrumented_classes(discovery.classes(), full);
    }

    pub fn assert_uninstrumented_packages(&self, namespace: &Namespace, packages: &[&str], full: bool) {
        for package in packages {
            self.assert_uninstrumented_package(namespace, package, full);
        }
    }

    // endregion

    fn check_without_layer(&self, record: &MethodInstrumentation, owner: &str, method: &str) {
        assert!(
            !record.contains_instrument(self.instrumentor.instrument()),
            "{owner}.{method} still carries the instrument"
        );
    }
}

fn is_property(class: &ClassRef, method: &str) -> bool {
    matches!(class.resolve(method), Some((_, Member::Property(_))))
}

/// The callable `class` itself publishes under `method`.
fn published_by(class: &ClassRef, method: &str) -> Option<crate::model::Callable> {
    match class.declared(method)? {
        Member::Method(callable) | Member::Property(callable) => Some(callable),
        Member::Delegator(delegator) => delegator.inner,
    }
}
