mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pipeline_instrumentation::config::InstrumentorSettings;
use pipeline_instrumentation::instruments::{CallRecorder, Composed, InstrumentRef, TimeElapsedLogger};
use pipeline_instrumentation::model::{Class, Member, Object, Value};
use pipeline_instrumentation::telemetry::TelemetryEvent;
use pipeline_instrumentation::testing::InstrumentationAsserter;
use pipeline_instrumentation::Instrumentor;

#[test]
fn test_aliased_child_logs_one_pair() {
    let e = common::estimators();
    let child = Object::new(&e.scaler);
    let root = Object::with_attrs(
        &e.union,
        [
            ("child", Value::from(&child)),
            ("items", Value::List(vec![Value::from(&child)])),
        ],
    )
    .unwrap();
    let recorder = CallRecorder::new();
    let instrumentor = Instrumentor::new(Arc::new(recorder.clone()));

    instrumentor.instrument_instance(&root, None, true).unwrap();
    let child = root.attr("child").unwrap();
    child.as_object().unwrap().call("transform", &[common::x()]).unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], TelemetryEvent::Entering { .. }));
    assert!(matches!(events[1], TelemetryEvent::Exiting { .. }));
}

#[test]
fn test_inherited_method_restored_by_full_class_uninstrument() {
    let base = Class::builder("B")
        .module("tests")
        .instrumentable()
        .method("m", |_this, _args| Ok(Value::Int(1)))
        .build();
    let sub = Class::builder("S").module("tests").parent(&base).build();
    let original = match base.declared("m") {
        Some(Member::Method(callable)) => callable,
        other => panic!("unexpected member {other:?}"),
    };
    let counter = Arc::new(AtomicUsize::new(0));
    let settings = InstrumentorSettings::default().with_methods(["m"]);
    let instrumentor = Instrumentor::with_settings(common::counting(&counter), settings).unwrap();

    instrumentor.instrument_class(&sub).unwrap();
    let record = sub.instrumentation("m").unwrap();
    assert!(record.is_owned_by(&sub) && record.inherited());
    assert!(base.instrumentation("m").is_none());
    assert_eq!(Object::new(&sub).call("m", &[]).unwrap(), Value::Int(1));
    assert_eq!(Object::new(&base).call("m", &[]).unwrap(), Value::Int(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    instrumentor.uninstrument_class(&sub, true).unwrap();

    assert!(!sub.declared_names().contains(&"m".to_string()));
    let (defining, member) = sub.resolve("m").unwrap();
    assert!(Arc::ptr_eq(&defining, &base));
    assert!(matches!(member, Member::Method(callable) if callable.same(&original)));
}

#[test]
fn test_instance_and_class_layers_stack() {
    let e = common::estimators();
    let model = common::classification_model(&e);
    let recorder = CallRecorder::new();
    let layers: Vec<InstrumentRef> = vec![Arc::new(recorder.clone()), Arc::new(TimeElapsedLogger)];
    let timed: InstrumentRef = Arc::new(Composed::new(layers));
    let on_instances = Instrumentor::new(Arc::clone(&timed));
    let (class_recorder, class_instrument) = common::recorder();
    let on_classes = Instrumentor::new(class_instrument);

    model.call("fit", &[common::x()]).unwrap();
    on_classes.instrument_instance_classes(&model).unwrap();
    on_instances.instrument_instance(&model, None, true).unwrap();
    model.call("predict", &[common::x()]).unwrap();

    assert_eq!(recorder.snapshot().calls, 6);
    assert_eq!(class_recorder.snapshot().calls, 6);

    on_instances.uninstrument_instance(&model, true, true).unwrap();
    InstrumentationAsserter::new(&on_instances).assert_uninstrumented_instance(&model, true, true);
    InstrumentationAsserter::new(&on_classes).assert_instrumented_classes(&on_classes.collect_classes(&model).unwrap());

    recorder.clear();
    class_recorder.clear();
    model.call("predict", &[common::x()]).unwrap();
    assert!(recorder.events().is_empty());
    assert_eq!(class_recorder.snapshot().calls, 6);

    on_classes.uninstrument_instance_classes(&model, true).unwrap();
    class_recorder.clear();
    model.call("predict", &[common::x()]).unwrap();
    assert!(class_recorder.events().is_empty());
}

#[test]
fn test_pipeline_of_pipelines() {
    let e = common::estimators();
    let inner = common::pipeline_of(&e, vec![Object::new(&e.scaler), Object::new(&e.pca)]);
    let shared_classifier = Object::new(&e.logistic);
    let outer = common::pipeline_of(&e, vec![Object::new(&e.tree), inner.clone(), shared_classifier.clone()]);
    outer.set_attr("backup", Value::from(&shared_classifier)).unwrap();
    let (_recorder, instrument) = common::recorder();
    let instrumentor = Instrumentor::new(instrument);

    let report = instrumentor.instrument_instance(&outer, None, true).unwrap();

    // outer, inner, scaler, pca, classifier; the tree is excluded
    assert_eq!(report.visited, 5);
    assert_eq!(report.excluded, 1);
    assert_eq!(shared_classifier.instrumentation("predict").unwrap().len(), 1);
    InstrumentationAsserter::new(&instrumentor).assert_instrumented_instance(&outer, true);

    instrumentor.uninstrument_instance(&outer, false, true).unwrap();
    InstrumentationAsserter::new(&instrumentor).assert_uninstrumented_instance(&outer, true, true);
}
