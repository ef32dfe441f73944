mod common;

use pipeline_instrumentation::error::CallError;
use pipeline_instrumentation::instrumentation::MethodInstrumentation;
use pipeline_instrumentation::instruments::{CallRecorder, InstrumentConfig, InstrumentRef, Scope, Target};
use pipeline_instrumentation::model::{Callable, Class, Object};
use pipeline_instrumentation::telemetry::{TelemetryEvent, TelemetryRecorder, MAX_EVENTS};
use std::sync::Arc;

#[test]
fn test_recorder_evicts_oldest_events() {
    let mut recorder = TelemetryRecorder::new();
    for i in 0..MAX_EVENTS + 5 {
        recorder.record(TelemetryEvent::Entering {
            target: format!("t{i}"),
        });
    }

    assert_eq!(recorder.len(), MAX_EVENTS);
    assert_eq!(recorder.events().next().map(TelemetryEvent::target), Some("t5"));
}

#[test]
fn test_snapshot_aggregates_per_target() {
    let mut recorder = TelemetryRecorder::new();
    let events = [
        TelemetryEvent::Entering { target: "a".into() },
        TelemetryEvent::Exiting { target: "a".into(), elapsed_micros: 10 },
        TelemetryEvent::Entering { target: "a".into() },
        TelemetryEvent::Exiting { target: "a".into(), elapsed_micros: 30 },
        TelemetryEvent::Entering { target: "b".into() },
        TelemetryEvent::Failed { target: "b".into(), elapsed_micros: 5, error: "boom".into() },
    ];
    for event in events {
        recorder.record(event);
    }

    let snapshot = recorder.snapshot();

    assert_eq!(snapshot.calls, 3);
    assert_eq!(snapshot.failures, 1);
    let a = snapshot.target("a").unwrap();
    assert_eq!(a.completed, 2);
    assert_eq!(a.total_elapsed_micros, 40);
    assert_eq!(a.max_elapsed_micros, 30);
    assert_eq!(a.avg_elapsed_micros, 20.0);
    assert_eq!(snapshot.target("b").unwrap().failed, 1);
}

#[test]
fn test_call_recorder_records_failures_and_propagates() {
    let recorder = CallRecorder::new();
    let instrument: InstrumentRef = Arc::new(recorder.clone());
    let failing = Callable::new(|_this, _args| Err(CallError::Failed("diverged".to_string())));
    let mut record = MethodInstrumentation::new(Target::new("tests.Model", "fit", Scope::Class), failing);
    record.add(&instrument, &InstrumentConfig::new());
    let receiver = Object::new(&Class::builder("Model").module("tests").build());

    let err = record.composed().call(&receiver, &[]).unwrap_err();

    assert_eq!(err, CallError::Failed("diverged".to_string()));
    let events = recorder.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        TelemetryEvent::Failed { target, error, .. } if target == "tests.Model.fit" && error == "diverged"
    ));
}

#[test]
fn test_events_serialize_without_payloads() {
    let event = TelemetryEvent::Exiting {
        target: "sklearn.pipeline.Pipeline.predict".into(),
        elapsed_micros: 42,
    };

    let json = serde_json::to_value(&event).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "Exiting": { "target": "sklearn.pipeline.Pipeline.predict", "elapsed_micros": 42 }
        })
    );
    let back: TelemetryEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn test_shared_recorder_collects_from_several_instruments() {
    let shared = TelemetryRecorder::shared();
    let first = CallRecorder::with_recorder(Arc::clone(&shared));
    let second = CallRecorder::with_recorder(Arc::clone(&shared));
    let e = common::estimators();
    let scaler = Object::new(&e.scaler);
    let pca = Object::new(&e.pca);
    pipeline_instrumentation::Instrumentor::new(Arc::new(first))
        .instrument_instance(&scaler, None, true)
        .unwrap();
    pipeline_instrumentation::Instrumentor::new(Arc::new(second.clone()))
        .instrument_instance(&pca, None, true)
        .unwrap();

    scaler.call("transform", &[common::x()]).unwrap();
    pca.call("transform", &[common::x()]).unwrap();

    assert_eq!(second.snapshot().calls, 2);
    assert_eq!(shared.lock().unwrap().len(), 4);
}
