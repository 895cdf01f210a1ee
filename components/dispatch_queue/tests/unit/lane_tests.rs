//! Unit tests for the execution lane

use dispatch_queue::ExecutionLane;
use engine_api::testing::StubEngine;
use std::sync::{Arc, Barrier, Mutex};

fn spawn_stub_lane() -> ExecutionLane {
    ExecutionLane::spawn(|| Box::new(StubEngine::new())).unwrap()
}

#[test]
fn concurrent_submissions_complete_in_acceptance_order() {
    let lane = spawn_stub_lane();
    let order = Arc::new(Mutex::new(Vec::new()));
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let lane = lane.clone();
            let order = order.clone();
            let accepted = accepted.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                // acceptance order is decided under the same lock that
                // records it, so the expected order is well-defined even
                // though the eight threads race
                let mut accepted = accepted.lock().unwrap();
                accepted.push(i);
                let order = order.clone();
                lane.submit(move |_| order.lock().unwrap().push(i)).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    lane.submit_sync(|_| ()).unwrap();
    assert_eq!(*order.lock().unwrap(), *accepted.lock().unwrap());
    lane.shutdown();
}

#[test]
fn microtasks_drain_between_items() {
    let lane = spawn_stub_lane();

    // first item: settle a promise; its reaction is only a queued microtask
    let observed = Arc::new(Mutex::new(false));
    let sink = observed.clone();
    let probe = observed.clone();
    lane.submit_sync(move |context| {
        let engine = context.engine();
        let parts = engine.new_promise().unwrap();
        let handler = engine.wrap_function(
            "observer",
            Box::new(move |engine, _| {
                *sink.lock().unwrap() = true;
                Ok(engine.undefined())
            }),
        );
        let then = engine.get_property(parts.promise, "then").unwrap();
        engine.call_function(then, None, &[handler]).unwrap();
        engine
            .call_function(parts.resolve, None, &[engine.undefined()])
            .unwrap();
        // still queued: the lane drains after the item returns
        assert!(!*probe.lock().unwrap());
    })
    .unwrap();

    // second item observes the settled state
    let check = observed.clone();
    lane.submit_sync(move |_| assert!(*check.lock().unwrap()))
        .unwrap();
    lane.shutdown();
}

#[test]
fn sync_submission_observes_prior_async_work() {
    let lane = spawn_stub_lane();
    lane.submit(|context| {
        let value = context.engine().value_from_json("11").unwrap();
        context
            .engine()
            .set_property(context.engine().global(), "counter", value)
            .unwrap();
    })
    .unwrap();

    let json = lane
        .submit_sync(|context| {
            let engine = context.engine();
            let value = engine.get_property(engine.global(), "counter").unwrap();
            engine.value_to_json(value).unwrap()
        })
        .unwrap();
    assert_eq!(json, "11");
    lane.shutdown();
}

#[test]
fn engine_is_dropped_on_shutdown() {
    let (engine, handle) = StubEngine::with_handle();
    let lane = ExecutionLane::spawn(move || Box::new(engine)).unwrap();
    lane.submit_sync(|context| {
        context.engine().evaluate("1").unwrap();
    })
    .unwrap();
    lane.shutdown();
    // the handle still reads the shared table, but the lane accepted no
    // further work after shutdown
    assert_eq!(handle.evaluated_sources(), vec!["1"]);
    assert!(lane.submit(|_| ()).is_err());
}
