use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ExcludeSet;
use crate::error::{AccessError, InstrumentError};
use crate::model::{ForeignNode, ObjectRef, Value};

/// Counters of a finished walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    /// Instrumentable objects handed to the visitor.
    pub visited: usize,
    /// Objects cut off (with their subtree) by the exclude set.
    pub excluded: usize,
    /// Branches dropped because their children could not be read.
    pub skipped: usize,
}

/// How the walker sees a value.
enum Node {
    Leaf,
    Container(Vec<Value>),
    Object(ObjectRef),
    Foreign(Arc<dyn ForeignNode>),
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::List(items) => Node::Container(items),
            Value::Map(entries) => Node::Container(entries.into_values().collect()),
            Value::Object(obj) => Node::Object(obj),
            Value::Foreign(foreign) => Node::Foreign(foreign),
            _ => Node::Leaf,
        }
    }
}

/// Depth-first traversal over attributes, maps and lists, visiting every
/// reachable object at most once.
pub struct GraphWalker<'a> {
    exclude: &'a ExcludeSet,
    recursive: bool,
    seen: HashSet<usize>,
    /// Visited nodes, held so no address in `seen` can be reused mid-walk.
    held: Vec<Value>,
    report: WalkReport,
}

impl<'a> GraphWalker<'a> {
    pub fn new(exclude: &'a ExcludeSet, recursive: bool) -> Self {
        Self {
            exclude,
            recursive,
            seen: HashSet::new(),
            held: Vec::new(),
            report: WalkReport::default(),
        }
    }

    /// Calls `visitor` on every instrumentable object outside the exclude
    /// set. Visitor errors abort the walk; unreadable branches do not.
    pub fn walk<F>(self, root: &Value, mut visitor: F) -> Result<WalkReport, InstrumentError>
    where
        F: FnMut(&ObjectRef) -> Result<(), InstrumentError>,
    {
        self.walk_marking_excluded(root, |obj, excluded| {
            if excluded {
                Ok(())
            } else {
                visitor(obj)
            }
        })
    }

    /// Like `walk`, but also hands over instrumentable roots of excluded
    /// subtrees with `excluded = true`. Their descendants are not entered.
    pub fn walk_marking_excluded<F>(
        mut self,
        root: &Value,
        mut visitor: F,
    ) -> Result<WalkReport, InstrumentError>
    where
        F: FnMut(&ObjectRef, bool) -> Result<(), InstrumentError>,
    {
        let mut stack = vec![root.clone()];
        let mut at_root = true;

        while let Some(value) = stack.pop() {
            let descend = self.recursive || at_root;
            at_root = false;
            match Node::from(value) {
                Node::Leaf => {}
                Node::Container(children) => {
                    if descend {
                        stack.extend(children.into_iter().rev());
                    }
                }
                Node::Object(obj) => {
                    if !self.first_visit(Arc::as_ptr(&obj) as *const ()) {
                        continue;
                    }
                    self.held.push(Value::Object(Arc::clone(&obj)));
                    if self.exclude.excludes(obj.class()) {
                        debug!("Not walking (excluded): {}", obj);
                        self.report.excluded += 1;
                        if obj.class().is_instrumentable() {
                            visitor(&obj, true)?;
                        }
                        continue;
                    }
                    if obj.class().is_instrumentable() {
                        visitor(&obj, false)?;
                        self.report.visited += 1;
                    }
                    if self.recursive {
                        let children = obj
                            .attrs()
                            .map(|attrs| attrs.into_iter().map(|(_, v)| v).collect());
                        self.push_children(&mut stack, children);
                    }
                }
                Node::Foreign(foreign) => {
                    if !self.first_visit(Arc::as_ptr(&foreign) as *const ()) {
                        continue;
                    }
                    self.held.push(Value::Foreign(Arc::clone(&foreign)));
                    if self.recursive {
                        self.push_children(&mut stack, foreign.children());
                    }
                }
            }
        }

        Ok(self.report)
    }

    fn first_visit(&mut self, addr: *const ()) -> bool {
        self.seen.insert(addr as usize)
    }

    fn push_children(&mut self, stack: &mut Vec<Value>, children: Result<Vec<Value>, AccessError>) {
        match children {
            Ok(children) => stack.extend(children.into_iter().rev()),
            Err(err) => {
                warn!("Skipping branch during walk: {}", err);
                self.report.skipped += 1;
            }
        }
    }
}
