mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pipeline_instrumentation::error::CallError;
use pipeline_instrumentation::instrumentation::MethodInstrumentation;
use pipeline_instrumentation::instruments::{Composed, Identity, InstrumentConfig, InstrumentRef, Scope, Target};
use pipeline_instrumentation::model::{Callable, Class, Object, ObjectRef, Value};

fn receiver() -> ObjectRef {
    Object::new(&Class::builder("Receiver").instrumentable().build())
}

fn record() -> MethodInstrumentation {
    let original = Callable::new(|_this, args| Ok(args.first().cloned().unwrap_or(Value::None)));
    MethodInstrumentation::new(Target::new("tests.Receiver", "fit", Scope::Class), original)
}

#[test]
fn test_add_is_idempotent() {
    let counter = Arc::new(AtomicUsize::new(0));
    let instrument = common::counting(&counter);
    let config = InstrumentConfig::new().with("label", "fit");
    let mut record = record();

    assert!(record.add(&instrument, &config));
    let composed = record.composed().clone();
    assert!(!record.add(&instrument, &config));

    assert_eq!(record.len(), 1);
    assert!(record.composed().same(&composed));
    record.composed().call(&receiver(), &[Value::Int(1)]).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_same_instrument_with_new_config_stacks() {
    let counter = Arc::new(AtomicUsize::new(0));
    let instrument = common::counting(&counter);
    let mut record = record();

    record.add(&instrument, &InstrumentConfig::new().with("level", "info"));
    record.add(&instrument, &InstrumentConfig::new().with("level", "debug"));
    assert_eq!(record.len(), 2);

    // removal is keyed by instrument alone
    assert_eq!(record.remove(&instrument), 2);
    assert!(record.is_empty());
}

#[test]
fn test_removal_in_any_order_restores_original() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = common::tagging("a", &log);
    let b = common::tagging("b", &log);
    let c = common::tagging("c", &log);
    let config = InstrumentConfig::new();

    for order in [[0, 1, 2], [2, 0, 1], [1, 2, 0]] {
        let mut record = record();
        let all = [&a, &b, &c];
        for instrument in all {
            record.add(instrument, &config);
        }
        assert!(!record.composed().same(record.original()));
        for i in order {
            record.remove(all[i]);
        }
        assert!(record.is_empty());
        assert!(record.composed().same(record.original()));
    }
}

#[test]
fn test_layers_nest_in_insertion_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = common::tagging("a", &log);
    let b = common::tagging("b", &log);
    let mut record = record();
    record.add(&a, &InstrumentConfig::new());
    record.add(&b, &InstrumentConfig::new());

    for _ in 0..3 {
        log.lock().unwrap().clear();
        record.composed().call(&receiver(), &[]).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["b:before", "a:before", "a:after", "b:after"]
        );
    }
}

#[test]
fn test_remove_of_absent_instrument_is_noop() {
    let counter = Arc::new(AtomicUsize::new(0));
    let applied = common::counting(&counter);
    let other = common::counting(&counter);
    let mut record = record();
    record.add(&applied, &InstrumentConfig::new());
    let composed = record.composed().clone();

    assert_eq!(record.remove(&other), 0);
    assert!(record.composed().same(&composed));
    assert!(record.contains(&applied, &InstrumentConfig::new()));
    assert!(!record.contains(&applied, &InstrumentConfig::new().with("k", 1)));
}

#[test]
fn test_errors_from_original_propagate_through_layers() {
    let counter = Arc::new(AtomicUsize::new(0));
    let instrument = common::counting(&counter);
    let failing = Callable::new(|_this, _args| Err(CallError::Failed("boom".to_string())));
    let mut record = MethodInstrumentation::new(Target::new("tests.Receiver", "predict", Scope::Class), failing);
    record.add(&instrument, &InstrumentConfig::new());

    let err = record.composed().call(&receiver(), &[]).unwrap_err();
    assert_eq!(err, CallError::Failed("boom".to_string()));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_composed_instrument_runs_first_listed_innermost() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let layers: Vec<InstrumentRef> = vec![
        common::tagging("inner", &log),
        Arc::new(Identity),
        common::tagging("outer", &log),
    ];
    let composed: InstrumentRef = Arc::new(Composed::new(layers));
    let mut record = record();
    record.add(&composed, &InstrumentConfig::new());

    let value = record.composed().call(&receiver(), &[Value::Int(7)]).unwrap();
    assert_eq!(value, Value::Int(7));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["outer:before", "inner:before", "inner:after", "outer:after"]
    );
}
