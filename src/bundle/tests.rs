use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Bundle, BundleEvent, BundleState, EventKind, Events};
use crate::backend::BuildOptions;
use crate::backend::fake::{FakeFactory, Mode, wait_until};
use crate::error::Error;
use crate::logger::MemoryLog;

const ENTRY: &str = "/project/src/entry.js";

fn bundle(factory: &FakeFactory) -> (Bundle<FakeFactory>, Arc<MemoryLog>, Events) {
    let log = Arc::new(MemoryLog::default());
    let events = Events::new();
    let file = PathBuf::from(ENTRY);
    let bundle = Bundle::new(
        file.clone(),
        BuildOptions::default().for_entry(&file),
        Arc::new(factory.clone()),
        log.clone(),
        events.clone(),
    );
    (bundle, log, events)
}

fn record(events: &Events) -> Arc<Mutex<Vec<BundleEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Start, EventKind::Done, EventKind::Stop] {
        let sink = Arc::clone(&seen);
        events.on(kind, move |ev| sink.lock().push(ev.clone()));
    }
    seen
}

fn kinds(seen: &Mutex<Vec<BundleEvent>>) -> Vec<EventKind> {
    seen.lock().iter().map(BundleEvent::kind).collect()
}

#[tokio::test]
async fn test_fresh_bundle_is_dirty() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);

    assert!(bundle.is_dirty());
    assert_eq!(bundle.state(), BundleState::Dirty);
    assert!(bundle.read().try_get().is_none());
    assert_eq!(factory.contexts(), 0, "backend is created lazily");
}

#[tokio::test]
async fn test_write_builds_and_resolves() {
    let factory = FakeFactory::open();
    let (bundle, log, _) = bundle(&factory);

    let artifact = bundle.write().wait().await.unwrap();
    assert_eq!(artifact.code_str(), format!("build 1 of {ENTRY}"));
    assert_eq!(artifact.map.sources, vec!["/src/entry.ts".to_owned()]);
    assert_eq!(artifact.map.file.as_deref(), Some("entry.js"));

    assert_eq!(bundle.state(), BundleState::Clean);
    assert_eq!(bundle.builds(), 0);
    assert_eq!(bundle.sourcemap(), artifact.map);
    assert!(log.errors.lock().is_empty());

    // Clean: write() returns the settled artifact without building
    assert_eq!(bundle.write().wait().await.unwrap(), artifact);
    assert_eq!(factory.calls(), 1);
}

#[tokio::test]
async fn test_at_most_one_build_under_reentrant_dirty() {
    let factory = FakeFactory::gated();
    let (bundle, _, _) = bundle(&factory);

    let first = bundle.write();
    wait_until(|| factory.calls() == 1).await;

    for _ in 0..5 {
        bundle.dirty();
        let again = bundle.write();
        assert!(again.try_get().is_none());
    }
    assert_eq!(bundle.state(), BundleState::BuildingDirty);
    assert_eq!(bundle.builds(), 1);

    factory.release(2);
    let artifact = first.wait().await.unwrap();

    assert_eq!(factory.calls(), 2, "burst coalesced into one follow-up build");
    assert_eq!(factory.max_active(), 1);
    assert_eq!(artifact.code_str(), format!("build 2 of {ENTRY}"));
}

#[tokio::test]
async fn test_stale_build_is_never_delivered() {
    let factory = FakeFactory::gated();
    let (bundle, _, events) = bundle(&factory);
    let seen = record(&events);

    let early = bundle.write();
    wait_until(|| factory.calls() == 1).await;

    bundle.dirty();
    let late = bundle.read();

    // First build finishes after the dirty(): its result is discarded and the
    // follow-up build starts on its own
    factory.release(1);
    wait_until(|| factory.calls() == 2).await;
    assert!(early.try_get().is_none(), "stale artifact leaked");
    assert_eq!(bundle.state(), BundleState::Building);

    factory.release(1);
    let early = early.wait().await.unwrap();
    let late = late.wait().await.unwrap();
    assert_eq!(early, late);
    assert_eq!(late.code_str(), format!("build 2 of {ENTRY}"));

    // One batch: a single start and a single done
    assert_eq!(kinds(&seen), vec![EventKind::Start, EventKind::Done]);
}

#[tokio::test]
async fn test_read_reflects_every_prior_dirty() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);

    bundle.write().wait().await.unwrap();
    bundle.dirty();
    let pending = bundle.read();
    assert!(pending.try_get().is_none());

    bundle.write();
    let artifact = pending.wait().await.unwrap();
    assert_eq!(artifact.code_str(), format!("build 2 of {ENTRY}"));
}

#[tokio::test]
async fn test_dirty_is_idempotent_while_dirty() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);

    let a = bundle.read();
    bundle.dirty();
    bundle.dirty();
    let b = bundle.read();

    bundle.write();
    assert_eq!(a.wait().await.unwrap(), b.wait().await.unwrap());
    assert_eq!(factory.calls(), 1);
}

#[tokio::test]
async fn test_failure_produces_placeholder() {
    let factory = FakeFactory::open();
    factory.set_mode(Mode::Fail("syntax error".into()));
    let (bundle, log, _) = bundle(&factory);

    let artifact = bundle.write().wait().await.unwrap();
    assert_eq!(artifact.code_str(), r#"console.error("syntax error")"#);
    assert!(artifact.is_placeholder());
    assert_eq!(*log.errors.lock(), vec!["syntax error".to_owned()]);
    assert_eq!(bundle.state(), BundleState::Clean);

    // Next build recovers
    factory.set_mode(Mode::Ok);
    bundle.dirty();
    let artifact = bundle.write().wait().await.unwrap();
    assert!(!artifact.is_placeholder());
}

#[tokio::test]
async fn test_failed_build_keeps_previous_sourcemap() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);

    let good = bundle.write().wait().await.unwrap();
    factory.set_mode(Mode::Fail("boom".into()));
    bundle.dirty();
    bundle.write().wait().await.unwrap();

    assert_eq!(bundle.sourcemap(), good.map);
}

#[tokio::test]
async fn test_stale_failure_is_superseded() {
    let factory = FakeFactory::gated();
    factory.set_mode(Mode::Fail("first".into()));
    let (bundle, log, _) = bundle(&factory);

    let promise = bundle.write();
    wait_until(|| factory.calls() == 1).await;
    bundle.dirty();
    factory.release(1);
    wait_until(|| factory.calls() == 2).await;

    factory.set_mode(Mode::Ok);
    factory.release(1);
    let artifact = promise.wait().await.unwrap();
    assert!(!artifact.is_placeholder());
    assert_eq!(*log.errors.lock(), vec!["first".to_owned()]);
}

#[tokio::test]
async fn test_panic_produces_placeholder() {
    let factory = FakeFactory::open();
    factory.set_mode(Mode::Panic);
    let (bundle, log, _) = bundle(&factory);

    let artifact = bundle.write().wait().await.unwrap();
    assert_eq!(artifact.code_str(), r#"console.error("build panicked")"#);
    assert_eq!(*log.errors.lock(), vec!["build panicked".to_owned()]);
    assert_eq!(bundle.builds(), 0);
}

#[tokio::test]
async fn test_missing_outputs_produce_placeholder() {
    let factory = FakeFactory::open();
    factory.set_mode(Mode::Single);
    let (bundle, _, _) = bundle(&factory);

    let artifact = bundle.write().wait().await.unwrap();
    assert_eq!(artifact.code_str(), r#"console.error("No output files.")"#);
}

#[tokio::test]
async fn test_invalid_map_produces_placeholder() {
    let factory = FakeFactory::open();
    factory.set_mode(Mode::BadMap);
    let (bundle, log, _) = bundle(&factory);

    let artifact = bundle.write().wait().await.unwrap();
    assert!(artifact.code_str().contains("invalid source map"));
    assert_eq!(log.errors.lock().len(), 1);
}

#[tokio::test]
async fn test_context_created_once() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);

    for _ in 0..3 {
        bundle.dirty();
        bundle.write().wait().await.unwrap();
    }
    assert_eq!(factory.contexts(), 1);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_build() {
    let factory = FakeFactory::gated();
    let (bundle, _, events) = bundle(&factory);
    let seen = record(&events);

    let promise = bundle.write();
    wait_until(|| factory.calls() == 1).await;

    let stopping = tokio::spawn({
        let bundle = bundle.clone();
        async move { bundle.stop().await }
    });
    tokio::task::yield_now().await;
    assert!(!stopping.is_finished());
    assert_eq!(factory.disposed(), 0);

    factory.release(1);
    stopping.await.unwrap();

    assert!(promise.try_get().is_some());
    assert_eq!(factory.disposed(), 1);
    assert_eq!(bundle.state(), BundleState::Stopped);
    assert_eq!(
        kinds(&seen),
        vec![EventKind::Start, EventKind::Done, EventKind::Stop]
    );
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let factory = FakeFactory::gated();
    let (bundle, _, events) = bundle(&factory);
    let seen = record(&events);

    bundle.write();
    wait_until(|| factory.calls() == 1).await;

    let a = tokio::spawn({
        let bundle = bundle.clone();
        async move { bundle.stop().await }
    });
    let b = tokio::spawn({
        let bundle = bundle.clone();
        async move { bundle.stop().await }
    });
    factory.release(1);
    a.await.unwrap();
    b.await.unwrap();
    bundle.stop().await;

    assert_eq!(factory.disposed(), 1);
    let stops = kinds(&seen)
        .into_iter()
        .filter(|k| *k == EventKind::Stop)
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test]
async fn test_stop_waits_through_stale_rebuild() {
    let factory = FakeFactory::gated();
    let (bundle, _, _) = bundle(&factory);

    bundle.write();
    wait_until(|| factory.calls() == 1).await;
    bundle.dirty();

    let stopping = tokio::spawn({
        let bundle = bundle.clone();
        async move { bundle.stop().await }
    });
    factory.release(1);
    wait_until(|| factory.calls() == 2).await;
    assert!(!stopping.is_finished());

    factory.release(1);
    stopping.await.unwrap();
    assert_eq!(factory.disposed(), 1);
    let artifact = bundle.read().try_get().unwrap().unwrap();
    assert_eq!(artifact.code_str(), format!("build 2 of {ENTRY}"));
}

#[tokio::test]
async fn test_stop_builds_owed_dirty_entry() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);

    // Never written: stop() issues the build itself instead of hanging
    bundle.stop().await;
    assert_eq!(factory.calls(), 1);
    assert!(bundle.read().try_get().is_some());
    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_stop_on_clean_bundle_without_context() {
    let factory = FakeFactory::open();
    let (bundle, _, events) = bundle(&factory);
    let seen = record(&events);

    bundle.write().wait().await.unwrap();
    bundle.stop().await;
    assert_eq!(factory.disposed(), 1);
    assert_eq!(kinds(&seen).last(), Some(&EventKind::Stop));
}

#[tokio::test]
async fn test_dirty_and_write_ignored_after_stop() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);

    let artifact = bundle.write().wait().await.unwrap();
    bundle.stop().await;

    bundle.dirty();
    assert!(!bundle.is_dirty());
    assert_eq!(bundle.write().wait().await.unwrap(), artifact);
    assert_eq!(bundle.read().wait().await, Ok(artifact));
    assert_eq!(factory.calls(), 1);
}

#[tokio::test]
async fn test_event_payloads() {
    let factory = FakeFactory::open();
    let (bundle, _, events) = bundle(&factory);
    let seen = record(&events);

    bundle.write().wait().await.unwrap();

    let seen = seen.lock();
    let BundleEvent::Start { file, time } = &seen[0] else {
        panic!("expected start, got {:?}", seen[0]);
    };
    let BundleEvent::Done { start, end, .. } = &seen[1] else {
        panic!("expected done, got {:?}", seen[1]);
    };
    assert_eq!(file, &PathBuf::from(ENTRY));
    assert_eq!(start, time);
    assert!(end >= start);
}

#[tokio::test]
async fn test_dropped_bundle_abandons_readers() {
    let factory = FakeFactory::open();
    let (bundle, _, _) = bundle(&factory);
    let promise = bundle.read();
    drop(bundle);
    assert_eq!(promise.wait().await, Err(Error::Abandoned));
}
