use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::InstrumentError;
use crate::model::{read_lock, write_lock, ClassRef};

/// A loaded module and the classes it defines.
#[derive(Debug, Clone)]
pub struct Module {
    path: String,
    classes: Vec<ClassRef>,
}

impl Module {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: &ClassRef) -> Self {
        self.classes.push(Arc::clone(class));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn classes(&self) -> &[ClassRef] {
        &self.classes
    }
}

type Loader = Box<dyn Fn() -> Result<Module, String> + Send + Sync>;

/// Registry of importable modules, addressed by dotted path.
///
/// Loaders run lazily on first import; only successful imports are cached,
/// so a failing module is retried on the next import.
#[derive(Default)]
pub struct Namespace {
    loaders: BTreeMap<String, Loader>,
    loaded: RwLock<BTreeMap<String, Arc<Module>>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, path: &str, loader: F)
    where
        F: Fn() -> Result<Module, String> + Send + Sync + 'static,
    {
        self.loaders.insert(path.to_string(), Box::new(loader));
    }

    /// Register an already built module.
    pub fn add_module(&mut self, module: Module) {
        let path = module.path.clone();
        let module = Arc::new(module);
        self.register(&path, move || Ok(Module::clone(&module)));
    }

    pub fn import(&self, path: &str) -> Result<Arc<Module>, InstrumentError> {
        if let Some(module) = read_lock(&self.loaded).get(path) {
            return Ok(Arc::clone(module));
        }
        let loader = self
            .loaders
            .get(path)
            .ok_or_else(|| InstrumentError::ImportFailure {
                module: path.to_string(),
                reason: "no such module".to_string(),
            })?;
        let module = Arc::new(loader().map_err(|reason| InstrumentError::ImportFailure {
            module: path.to_string(),
            reason,
        })?);
        write_lock(&self.loaded).insert(path.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// `package` itself (when registered) and every module below it.
    pub fn module_tree(&self, package: &str) -> Vec<String> {
        let prefix = format!("{package}.");
        self.loaders
            .keys()
            .filter(|path| path.as_str() == package || path.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

/// Instrumentable classes found under a package.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    pub package: String,
    #[serde(skip)]
    classes: BTreeMap<String, ClassRef>,
    /// Modules that failed to import and were skipped.
    pub failures: Vec<String>,
}

impl Discovery {
    /// Classes keyed by `module.Name`, in key order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassRef> {
        self.classes.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    pub fn get(&self, qualname: &str) -> Option<&ClassRef> {
        self.classes.get(qualname)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

pub struct DiscoveryService<'a> {
    namespace: &'a Namespace,
}

impl<'a> DiscoveryService<'a> {
    pub fn new(namespace: &'a Namespace) -> Self {
        Self { namespace }
    }

    /// Import every module under `package` and collect the instrumentable
    /// classes they define. A module that fails to import is logged and
    /// skipped; an unknown package is an error.
    pub fn discover(&self, package: &str) -> Result<Discovery, InstrumentError> {
        let modules = self.namespace.module_tree(package);
        if modules.is_empty() {
            return Err(InstrumentError::ImportFailure {
                module: package.to_string(),
                reason: "no such package".to_string(),
            });
        }

        let mut discovery = Discovery {
            package: package.to_string(),
            ..Discovery::default()
        };
        for path in modules {
            let module = match self.namespace.import(&path) {
                Ok(module) => module,
                Err(err) => {
                    warn!("Unable to import {}: {}", path, err);
                    discovery.failures.push(path);
                    continue;
                }
            };
            for class in module.classes() {
                if !class.is_instrumentable() {
                    continue;
                }
                // re-exported classes are listed once
                if discovery.classes.values().any(|c| Arc::ptr_eq(c, class)) {
                    continue;
                }
                discovery
                    .classes
                    .insert(format!("{}.{}", path, class.name()), Arc::clone(class));
            }
        }
        debug!(
            "Discovered {} classes under {} ({} failed imports)",
            discovery.len(),
            package,
            discovery.failures.len()
        );
        Ok(discovery)
    }
}
