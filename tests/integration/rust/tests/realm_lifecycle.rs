//! Realm teardown: timers dropped unfired, requests released, no events
//! after the facade is gone

use integration_tests::TestRealm;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn dropping_the_realm_drops_pending_timers_without_firing() {
    let fixture = TestRealm::new();
    let fired = Arc::new(Mutex::new(false));

    let sink = fired.clone();
    fixture
        .realm
        .with_lane(move |context| {
            let engine = context.engine();
            let callback = engine.wrap_function(
                "never",
                Box::new(move |engine, _| {
                    *sink.lock().unwrap() = true;
                    Ok(engine.undefined())
                }),
            );
            let set_timeout = engine.get_property(engine.global(), "setTimeout").unwrap();
            let delay = engine.value_from_json("40").unwrap();
            engine
                .call_function(set_timeout, None, &[callback, delay])
                .unwrap();
        })
        .unwrap();

    drop(fixture.realm);
    std::thread::sleep(Duration::from_millis(150));
    assert!(!*fired.lock().unwrap());
}

#[test]
fn dropping_the_realm_cancels_in_flight_requests() {
    let fixture = TestRealm::new();
    fixture.transport.hold();
    fixture.transport.push_response(200, &[], "late");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    fixture
        .realm
        .with_lane(move |context| {
            let engine = context.engine();
            let constructor = engine
                .get_property(engine.global(), "XMLHttpRequest")
                .unwrap();
            let xhr = engine.call_function(constructor, None, &[]).unwrap();
            let listener = engine.wrap_function(
                "spy",
                Box::new(move |engine, args| {
                    let kind = engine.get_property(args[0], "type")?;
                    sink.lock().unwrap().push(engine.value_to_json(kind)?);
                    Ok(engine.undefined())
                }),
            );
            let add = engine.get_property(xhr, "addEventListener").unwrap();
            for kind in ["load", "error", "loadend", "progress"] {
                let name = engine.value_from_json(&format!("\"{}\"", kind)).unwrap();
                engine
                    .call_function(add, Some(xhr), &[name, listener])
                    .unwrap();
            }

            let open = engine.get_property(xhr, "open").unwrap();
            let method = engine.value_from_json("\"GET\"").unwrap();
            let url = engine.value_from_json("\"http://example.test/slow\"").unwrap();
            engine.call_function(open, Some(xhr), &[method, url]).unwrap();
            let send = engine.get_property(xhr, "send").unwrap();
            engine.call_function(send, Some(xhr), &[]).unwrap();
        })
        .unwrap();

    // tear the realm down while the transport is still blocked
    drop(fixture.realm);
    fixture.transport.release();
    std::thread::sleep(Duration::from_millis(100));

    // the cancelled completion emitted nothing
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn teardown_releases_script_references_held_by_requests() {
    let fixture = TestRealm::new();

    let listener_id = fixture
        .realm
        .with_lane(|context| {
            let engine = context.engine();
            let constructor = engine
                .get_property(engine.global(), "XMLHttpRequest")
                .unwrap();
            let xhr = engine.call_function(constructor, None, &[]).unwrap();
            let listener =
                engine.wrap_function("held", Box::new(|engine, _| Ok(engine.undefined())));
            let add = engine.get_property(xhr, "addEventListener").unwrap();
            let name = engine.value_from_json("\"load\"").unwrap();
            engine
                .call_function(add, Some(xhr), &[name, listener])
                .unwrap();
            listener
        })
        .unwrap();

    assert!(fixture.handle.contains(listener_id));
    drop(fixture.realm);
    assert!(!fixture.handle.contains(listener_id));
}

#[test]
fn realm_survives_engine_exceptions_in_callbacks() {
    let fixture = TestRealm::new();
    let realm = &fixture.realm;

    realm
        .with_lane(|context| {
            let engine = context.engine();
            let bomb = engine.wrap_function(
                "bomb",
                Box::new(|_, _| Err(engine_api::ScriptException::new("kaboom"))),
            );
            let set_timeout = engine.get_property(engine.global(), "setTimeout").unwrap();
            engine.call_function(set_timeout, None, &[bomb]).unwrap();
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(80));
    // the lane absorbed the callback exception and keeps serving
    let value = realm.evaluate("7").unwrap();
    assert_eq!(value, serde_json::json!(7));
}
