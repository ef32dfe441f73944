use std::sync::Arc;

use pipeline_instrumentation::error::CallError;
use pipeline_instrumentation::instrumentation::{Module, Namespace};
use pipeline_instrumentation::instruments::{CallRecorder, Composed, InstrumentRef, TimeElapsedLogger};
use pipeline_instrumentation::model::{CallResult, Class, ClassRef, Object, ObjectRef, Value};
use pipeline_instrumentation::Instrumentor;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn buffer_arg(args: &[Value]) -> Result<Arc<[f64]>, CallError> {
    args.first()
        .and_then(Value::as_buffer)
        .cloned()
        .ok_or_else(|| CallError::InvalidArgument("expected a buffer as X".to_string()))
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}

fn step_objects(this: &ObjectRef, attr: &str) -> Vec<ObjectRef> {
    this.attr(attr)
        .and_then(|v| v.as_list().map(|items| items.iter().filter_map(Value::as_object).cloned().collect()))
        .unwrap_or_default()
}

/// Runs every step but the last as a transformer.
fn transform_through(this: &ObjectRef, x: Value, fit: bool) -> CallResult {
    let steps = step_objects(this, "steps");
    let mut x = x;
    for step in steps.iter().take(steps.len().saturating_sub(1)) {
        if fit {
            step.call("fit", &[x.clone()])?;
        }
        x = step.call("transform", &[x])?;
    }
    Ok(x)
}

struct Family {
    base: ClassRef,
    scaler: ClassRef,
    reducer: ClassRef,
    classifier: ClassRef,
    union: ClassRef,
    pipeline: ClassRef,
}

impl Family {
    fn build() -> Self {
        let base = Class::builder("BaseEstimator")
            .module("sklearn.base")
            .instrumentable()
            .build();

        let scaler = Class::builder("StandardScaler")
            .module("sklearn.preprocessing")
            .parent(&base)
            .method("fit", |this, args| {
                let x = buffer_arg(args)?;
                this.set_attr("mean_", Value::Float(mean(&x)))
                    .map_err(|e| CallError::Failed(e.to_string()))?;
                Ok(Value::from(this))
            })
            .method("transform", |this, args| {
                let x = buffer_arg(args)?;
                let m = this.attr("mean_").and_then(|v| v.as_float()).unwrap_or(0.0);
                Ok(Value::buffer(x.iter().map(|v| v - m).collect::<Vec<_>>()))
            })
            .build();

        let reducer = Class::builder("PCA")
            .module("sklearn.decomposition")
            .parent(&base)
            .method("fit", |this, _args| Ok(Value::from(this)))
            .method("transform", |_this, args| {
                let x = buffer_arg(args)?;
                Ok(Value::buffer(x.iter().step_by(2).copied().collect::<Vec<_>>()))
            })
            .build();

        let classifier = Class::builder("LogisticRegression")
            .module("sklearn.linear_model")
            .parent(&base)
            .method("fit", |this, _args| Ok(Value::from(this)))
            .method("predict_proba", |_this, args| {
                let x = buffer_arg(args)?;
                Ok(Value::buffer(x.iter().map(|v| 1.0 / (1.0 + (-v).exp())).collect::<Vec<_>>()))
            })
            .method("predict", |this, args| {
                let proba = this.call("predict_proba", args)?;
                let proba = buffer_arg(&[proba])?;
                Ok(Value::buffer(proba.iter().map(|p| if *p >= 0.5 { 1.0 } else { 0.0 }).collect::<Vec<_>>()))
            })
            .build();

        let union = Class::builder("FeatureUnion")
            .module("sklearn.pipeline")
            .parent(&base)
            .method("fit", |this, args| {
                for transformer in step_objects(this, "transformer_list") {
                    transformer.call("fit", args)?;
                }
                Ok(Value::from(this))
            })
            .method("transform", |this, args| {
                let mut out = Vec::new();
                for transformer in step_objects(this, "transformer_list") {
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
                let x = transform_through(this, args.first().cloned().unwrap_or(Value::None), true)?;
                if let Some(last) = step_objects(this, "steps").last() {
                    last.call("fit", &[x])?;
                }
                Ok(Value::from(this))
            })
            .delegator("predict", "final_estimator", |this, args| {
                let x = transform_through(this, args.first().cloned().unwrap_or(Value::None), false)?;
                let last = step_objects(this, "steps")
                    .pop()
                    .ok_or_else(|| CallError::Failed("empty pipeline".to_string()))?;
                last.call("predict", &[x])
            })
            .build();

        Self {
            base,
            scaler,
            reducer,
            classifier,
            union,
            pipeline,
        }
    }

    /// Pipeline(FeatureUnion(StandardScaler, PCA), LogisticRegression).
    fn model(&self) -> anyhow::Result<ObjectRef> {
        let features = Object::with_attrs(
            &self.union,
            [(
                "transformer_list",
                Value::List(vec![
                    Value::from(Object::new(&self.scaler)),
                    Value::from(Object::new(&self.reducer)),
                ]),
            )],
        )?;
        let classifier = Object::new(&self.classifier);
        let steps = Value::List(vec![Value::from(features), Value::from(&classifier)]);
        let model = Object::with_attrs(
            &self.pipeline,
            [("steps", steps), ("final_estimator", Value::from(classifier))],
        )?;
        Ok(model)
    }

    fn namespace(&self) -> Namespace {
        let mut namespace = Namespace::new();
        namespace.add_module(Module::new("sklearn.base").with_class(&self.base));
        namespace.add_module(Module::new("sklearn.preprocessing").with_class(&self.scaler));
        namespace.add_module(Module::new("sklearn.decomposition").with_class(&self.reducer));
        namespace.add_module(Module::new("sklearn.linear_model").with_class(&self.classifier));
        namespace.add_module(
            Module::new("sklearn.pipeline")
                .with_class(&self.union)
                .with_class(&self.pipeline),
        );
        namespace.register("sklearn.experimental", || Err("optional dependency missing".to_string()));
        namespace
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Building estimator pipeline...");

    let family = Family::build();
    let model = family.model()?;
    let x = Value::buffer(vec![0.5, -1.25, 2.0, 3.5, -0.75, 1.0]);
    model.call("fit", &[x.clone()])?;

    // Instance level: only this model's graph is wrapped.
    let timer = Instrumentor::new(Arc::new(TimeElapsedLogger));
    let report = timer.instrument_instance(&model, None, true)?;
    info!("Instance instrumentation visited {} estimators", report.visited);
    model.call("predict", &[x.clone()])?;
    timer.uninstrument_instance(&model, true, true)?;

    // Class level: every estimator class the namespace defines, timed and
    // counted.
    let recorder = CallRecorder::new();
    let layers: Vec<InstrumentRef> = vec![Arc::new(recorder.clone()), Arc::new(TimeElapsedLogger)];
    let timed = Instrumentor::new(Arc::new(Composed::new(layers)));
    let namespace = family.namespace();
    let discovery = timed.instrument_package(&namespace, "sklearn")?;
    info!(
        "Instrumented {} classes ({} modules skipped)",
        discovery.len(),
        discovery.failures.len()
    );

    model.call("fit", &[x.clone()])?;
    let prediction = model.call("predict", &[x])?;
    info!("Prediction: {:?}", prediction.as_buffer());
    println!("{}", serde_json::to_string_pretty(&recorder.snapshot())?);

    timed.uninstrument_package(&namespace, "sklearn", true)?;
    info!("Restored all classes");
    Ok(())
}
