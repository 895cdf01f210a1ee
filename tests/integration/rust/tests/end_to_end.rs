//! Full-stack scenarios: a host application driving scripts that use the
//! installed polyfills

use integration_tests::TestRealm;
use interpreter::{CallArg, ErrorKind, PendingPromise};
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn wait_until(check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for condition");
}

/// A script-side "SDK": an object whose `load` method issues a request and
/// settles a natively created promise with the decoded response. This is
/// the shape host applications build on top of the facade.
#[test]
fn script_request_settles_native_promise() {
    let fixture = TestRealm::new();
    let realm = &fixture.realm;
    fixture.transport.push_response(
        200,
        &[("Content-Type", "application/json")],
        r#"{"token": "abc123"}"#,
    );

    let (promise, resolver) = realm.native_promise().unwrap();
    realm
        .with_lane(move |context| {
            let engine = context.engine();
            let load = engine.wrap_function(
                "load",
                Box::new(move |engine, _| {
                    let constructor = engine.get_property(engine.global(), "XMLHttpRequest")?;
                    let xhr = engine.call_function(constructor, None, &[])?;
                    let kind = engine.value_from_json("\"json\"")?;
                    engine.set_property(xhr, "responseType", kind)?;

                    // onload reads the decoded response and resolves
                    let resolver = resolver.clone();
                    let on_load = engine.wrap_function(
                        "on_load",
                        Box::new(move |engine, args| {
                            let target = engine.get_property(args[0], "target")?;
                            let response = engine.get_property(target, "response")?;
                            let raw = engine.value_to_json(response)?;
                            resolver.resolve(vec![serde_json::from_str(&raw)
                                .unwrap_or(JsonValue::Null)]);
                            Ok(engine.undefined())
                        }),
                    );
                    engine.set_property(xhr, "onload", on_load)?;

                    let open = engine.get_property(xhr, "open")?;
                    let method = engine.value_from_json("\"GET\"")?;
                    let url = engine.value_from_json("\"http://api.test/token\"")?;
                    engine.call_function(open, Some(xhr), &[method, url])?;
                    let send = engine.get_property(xhr, "send")?;
                    engine.call_function(send, Some(xhr), &[])?;
                    Ok(engine.undefined())
                }),
            );
            let sdk = engine.value_from_json("{}").unwrap();
            engine.set_property(sdk, "load", load).unwrap();
            engine.set_property(engine.global(), "sdk", sdk).unwrap();
        })
        .unwrap();

    let pending: PendingPromise<JsonValue> =
        value_bridge::attach_promise(fixture.realm.lane(), promise);
    let result: JsonValue = realm.call_sync(None, "sdk.load", Vec::new()).unwrap();
    assert_eq!(result, JsonValue::Null);

    let settled = pending.wait_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(settled.unwrap(), json!({"token": "abc123"}));
}

/// Timers and calls interleave on one lane: a deferred script callback
/// runs strictly after the synchronous call that scheduled it.
#[test]
fn timer_callbacks_run_after_the_scheduling_call() {
    let fixture = TestRealm::new();
    let realm = &fixture.realm;
    let order = Arc::new(Mutex::new(Vec::new()));

    let sink = order.clone();
    realm
        .with_lane(move |context| {
            let engine = context.engine();
            let schedule = engine.wrap_function(
                "schedule",
                Box::new(move |engine, _| {
                    let fired = sink.clone();
                    let callback = engine.wrap_function(
                        "deferred",
                        Box::new(move |engine, _| {
                            fired.lock().unwrap().push("timer");
                            Ok(engine.undefined())
                        }),
                    );
                    let set_timeout = engine.get_property(engine.global(), "setTimeout")?;
                    let delay = engine.value_from_json("5")?;
                    engine.call_function(set_timeout, None, &[callback, delay])?;
                    Ok(engine.undefined())
                }),
            );
            engine
                .set_property(engine.global(), "schedule", schedule)
                .unwrap();
        })
        .unwrap();

    let _: JsonValue = realm.call_sync(None, "schedule", Vec::new()).unwrap();
    order.lock().unwrap().push("call returned");

    wait_until(|| order.lock().unwrap().len() == 2);
    assert_eq!(
        order.lock().unwrap().as_slice(),
        ["call returned", "timer"]
    );
}

/// The typed decode pass end to end: a script function computes a value
/// and the native caller receives it as a typed struct.
#[test]
fn typed_results_cross_the_boundary() {
    #[derive(serde::Deserialize, Debug, PartialEq, Clone)]
    struct Summary {
        total: u32,
        tags: Vec<String>,
    }

    let fixture = TestRealm::new();
    let realm = &fixture.realm;
    realm
        .with_lane(|context| {
            let engine = context.engine();
            let summarize = engine.wrap_function(
                "summarize",
                Box::new(|engine, _| {
                    engine.value_from_json(r#"{"total": 3, "tags": ["a", "b"]}"#)
                }),
            );
            engine
                .set_property(engine.global(), "summarize", summarize)
                .unwrap();
        })
        .unwrap();

    let summary: Summary = realm.call_sync(None, "summarize", Vec::new()).unwrap();
    assert_eq!(
        summary,
        Summary {
            total: 3,
            tags: vec!["a".to_string(), "b".to_string()]
        }
    );

    // the same call with an incompatible target type fails the decode
    let error = realm
        .call_sync::<Vec<u32>>(None, "summarize", Vec::new())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::ConversionFailed);
}

/// Arguments flow the other way too: native values and a native callback
/// handed to a script function.
#[test]
fn native_arguments_and_callbacks_reach_script() {
    let fixture = TestRealm::new();
    let realm = &fixture.realm;
    realm
        .with_lane(|context| {
            let engine = context.engine();
            let apply = engine.wrap_function(
                "apply",
                Box::new(|engine, args| {
                    // args: [payload, callback] — invoke callback(payload)
                    let payload = args[0];
                    let callback = args[1];
                    engine.call_function(callback, None, &[payload])?;
                    Ok(engine.undefined())
                }),
            );
            engine
                .set_property(engine.global(), "apply", apply)
                .unwrap();
        })
        .unwrap();

    let received = Arc::new(Mutex::new(None));
    let sink = received.clone();
    let _: JsonValue = realm
        .call_sync(
            None,
            "apply",
            vec![
                CallArg::value(json!({"id": 9})).unwrap(),
                CallArg::typed_callback::<JsonValue, _>(move |result| {
                    *sink.lock().unwrap() = Some(result.unwrap());
                }),
            ],
        )
        .unwrap();

    assert_eq!(
        received.lock().unwrap().clone().unwrap(),
        json!({"id": 9})
    );
}
