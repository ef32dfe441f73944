#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pipeline_instrumentation::error::CallError;
use pipeline_instrumentation::instrumentation::{Module, Namespace};
use pipeline_instrumentation::instruments::{CallRecorder, InstrumentConfig, InstrumentRef, Target};
use pipeline_instrumentation::model::{CallResult, Callable, Class, ClassRef, Object, ObjectRef, Value};

pub fn buffer_arg(args: &[Value]) -> Result<Arc<[f64]>, CallError> {
    args.first()
        .and_then(Value::as_buffer)
        .cloned()
        .ok_or_else(|| CallError::InvalidArgument("expected a buffer".to_string()))
}

fn objects(this: &ObjectRef, attr: &str) -> Vec<ObjectRef> {
    this.attr(attr)
        .and_then(|v| v.as_list().map(|items| items.iter().filter_map(Value::as_object).cloned().collect()))
        .unwrap_or_default()
}

fn fitted(this: &ObjectRef) -> CallResult {
    this.set_attr("fitted_", Value::Bool(true))
        .map_err(|e| CallError::Failed(e.to_string()))?;
    Ok(Value::from(this))
}

/// A fresh estimator family. Every call builds new classes so class-level
/// state never leaks between tests.
pub struct Estimators {
    pub base: ClassRef,
    pub scaler: ClassRef,
    pub pca: ClassRef,
    pub logistic: ClassRef,
    pub tree_base: ClassRef,
    pub tree: ClassRef,
    pub union: ClassRef,
    pub pipeline: ClassRef,
}

pub fn estimators() -> Estimators {
    let base = Class::builder("BaseEstimator")
        .module("sklearn.base")
        .instrumentable()
        .build();

    let scaler = Class::builder("StandardScaler")
        .module("sklearn.preprocessing")
        .parent(&base)
        .method("fit", |this, _args| fitted(this))
        .method("transform", |_this, args| {
            let x = buffer_arg(args)?;
            Ok(Value::buffer(x.iter().map(|v| v * 2.0).collect::<Vec<_>>()))
        })
        .build();

    let pca = Class::builder("PCA")
        .module("sklearn.decomposition")
        .parent(&base)
        .method("fit", |this, _args| fitted(this))
        .method("transform", |_this, args| {
            let x = buffer_arg(args)?;
            Ok(Value::buffer(x.iter().take(2).copied().collect::<Vec<_>>()))
        })
        .build();

    let logistic = Class::builder("LogisticRegression")
        .module("sklearn.linear_model")
        .parent(&base)
        .method("fit", |this, _args| fitted(this))
        .method("predict_proba", |_this, args| {
            let x = buffer_arg(args)?;
            Ok(Value::buffer(x.iter().map(|v| if *v > 0.0 { 0.9 } else { 0.1 }).collect::<Vec<_>>()))
        })
        .method("predict", |this, args| {
            let proba = this.call("predict_proba", args)?;
            let proba = buffer_arg(&[proba])?;
            Ok(Value::buffer(proba.iter().map(|p| if *p >= 0.5 { 1.0 } else { 0.0 }).collect::<Vec<_>>()))
        })
        .property("classes_", |this| {
            let n = match this.attr("n_classes") {
                Some(Value::Int(n)) => n,
                _ => 2,
            };
            Ok(Value::List((0..n).map(Value::Int).collect()))
        })
        .build();

    let tree_base = Class::builder("BaseDecisionTree")
        .module("sklearn.tree")
        .parent(&base)
        .method("fit", |this, _args| fitted(this))
        .method("predict", |_this, args| {
            let x = buffer_arg(args)?;
            Ok(Value::buffer(vec![0.0; x.len()]))
        })
        .build();

    let tree = Class::builder("DecisionTreeClassifier")
        .module("sklearn.tree")
        .parent(&tree_base)
        .build();

    let union = Class::builder("FeatureUnion")
        .module("sklearn.pipeline")
        .parent(&base)
        .method("fit", |this, args| {
            for transformer in objects(this, "transformer_list") {
                transformer.call("fit", args)?;
            }
            Ok(Value::from(this))
        })
        .method("transform", |this, args| {
            let mut out = Vec::new();
            for transformer in objects(this, "transformer_list") {
                let part = transformer.call("transform", args)?;
                out.extend_from_slice(&buffer_arg(&[part])?);
            }
            Ok(Value::buffer(out))
        })
        .build();

    let pipeline = Class::builder("Pipeline")
        .module("sklearn.pipeline")
        .parent(&base)
        .method("fit", |this, args| {
            let steps = objects(this, "steps");
            let mut x = args.first().cloned().unwrap_or(Value::None);
            for (i, step) in steps.iter().enumerate() {
                step.call("fit", &[x.clone()])?;
                if i + 1 < steps.len() {
                    x = step.call("transform", &[x])?;
                }
            }
            Ok(Value::from(this))
        })
        .delegator("predict", "final_estimator", |this, args| {
            run_pipeline(this, args, "predict")
        })
        .delegator("predict_proba", "final_estimator", |this, args| {
            run_pipeline(this, args, "predict_proba")
        })
        .build();

    Estimators {
        base,
        scaler,
        pca,
        logistic,
        tree_base,
        tree,
        union,
        pipeline,
    }
}

fn run_pipeline(this: &ObjectRef, args: &[Value], last_method: &str) -> CallResult {
    let mut steps = objects(this, "steps");
    let last = steps
        .pop()
        .ok_or_else(|| CallError::Failed("empty pipeline".to_string()))?;
    let mut x = args.first().cloned().unwrap_or(Value::None);
    for step in &steps {
        x = step.call("transform", &[x])?;
    }
    last.call(last_method, &[x])
}

pub fn pipeline_of(e: &Estimators, steps: Vec<ObjectRef>) -> ObjectRef {
    let last = steps.last().cloned();
    let pipeline = Object::new(&e.pipeline);
    pipeline
        .set_attr("steps", Value::List(steps.into_iter().map(Value::from).collect()))
        .unwrap();
    if let Some(last) = last {
        pipeline.set_attr("final_estimator", Value::from(last)).unwrap();
    }
    pipeline
}

/// Pipeline(FeatureUnion(StandardScaler, PCA), LogisticRegression).
pub fn classification_model(e: &Estimators) -> ObjectRef {
    let union = Object::with_attrs(
        &e.union,
        [(
            "transformer_list",
            Value::List(vec![
                Value::from(Object::new(&e.scaler)),
                Value::from(Object::new(&e.pca)),
            ]),
        )],
    )
    .unwrap();
    pipeline_of(e, vec![union, Object::new(&e.logistic)])
}

pub fn x() -> Value {
    Value::buffer(vec![1.0, -2.0, 3.0])
}

pub fn namespace(e: &Estimators) -> Namespace {
    let mut namespace = Namespace::new();
    namespace.add_module(Module::new("sklearn.base").with_class(&e.base));
    namespace.add_module(Module::new("sklearn.preprocessing").with_class(&e.scaler));
    namespace.add_module(Module::new("sklearn.decomposition").with_class(&e.pca));
    namespace.add_module(Module::new("sklearn.linear_model").with_class(&e.logistic));
    namespace.add_module(
        Module::new("sklearn.tree")
            .with_class(&e.tree_base)
            .with_class(&e.tree),
    );
    namespace.add_module(
        Module::new("sklearn.pipeline")
            .with_class(&e.union)
            .with_class(&e.pipeline),
    );
    namespace
}

pub fn recorder() -> (CallRecorder, InstrumentRef) {
    let recorder = CallRecorder::new();
    let instrument: InstrumentRef = Arc::new(recorder.clone());
    (recorder, instrument)
}

/// Instrument that bumps `counter` once per wrapped call.
pub fn counting(counter: &Arc<AtomicUsize>) -> InstrumentRef {
    let counter = Arc::clone(counter);
    Arc::new(move |_target: &Target, method: Callable, _config: &InstrumentConfig| {
        let counter = Arc::clone(&counter);
        Callable::new(move |this, args| {
            counter.fetch_add(1, Ordering::SeqCst);
            method.call(this, args)
        })
    })
}

/// Instrument that logs `tag:before` and `tag:after` around each call.
pub fn tagging(tag: &str, log: &Arc<Mutex<Vec<String>>>) -> InstrumentRef {
    let tag = tag.to_string();
    let log = Arc::clone(log);
    Arc::new(move |_target: &Target, method: Callable, _config: &InstrumentConfig| {
        let tag = tag.clone();
        let log = Arc::clone(&log);
        Callable::new(move |this, args| {
            log.lock().unwrap().push(format!("{tag}:before"));
            let result = method.call(this, args);
            log.lock().unwrap().push(format!("{tag}:after"));
            result
        })
    })
}
