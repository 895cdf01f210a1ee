//! Shared fixture: a lane over the stub engine with both polyfills
//! installed and a scripted transport.

use dispatch_queue::ExecutionLane;
use engine_api::testing::{StubEngine, StubHandle};
use engine_api::ValueId;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use web_polyfills::testing::MockTransport;
use web_polyfills::{HttpRequestPolyfill, TimerHub, TimerPolyfill};

pub struct Fixture {
    pub lane: ExecutionLane,
    pub handle: StubHandle,
    pub hub: TimerHub,
    pub timers: Arc<TimerPolyfill>,
    pub requests: Arc<HttpRequestPolyfill>,
    pub transport: MockTransport,
}

impl Fixture {
    pub fn new() -> Fixture {
        let (engine, handle) = StubEngine::with_handle();
        let lane = ExecutionLane::spawn(move || Box::new(engine)).unwrap();
        let hub = TimerHub::spawn().unwrap();
        let timers = TimerPolyfill::new(lane.clone(), hub.clone());
        let transport = MockTransport::new();
        let requests = HttpRequestPolyfill::new(lane.clone(), Arc::new(transport.clone()));

        let install_timers = timers.clone();
        let install_requests = requests.clone();
        lane.submit_sync(move |context| {
            install_timers.install(context).unwrap();
            install_requests.install(context).unwrap();
        })
        .unwrap();

        Fixture {
            lane,
            handle,
            hub,
            timers,
            requests,
            transport,
        }
    }

    pub fn shutdown(self) {
        self.hub.shutdown();
        self.lane.shutdown();
    }

    /// Calls a global function with the given arguments, on the lane.
    pub fn call_global(&self, name: &'static str, args: Vec<ValueId>) -> ValueId {
        self.lane
            .submit_sync(move |context| {
                let engine = context.engine();
                let function = engine.get_property(engine.global(), name).unwrap();
                engine.call_function(function, None, &args).unwrap()
            })
            .unwrap()
    }
}

/// A callback that appends `kind(readyState-of-target)` to `log` each
/// time it fires, reading the ready state off the event's target — the way
/// scripts observe transitions.
pub fn install_recorder(fixture: &Fixture, log: Arc<Mutex<Vec<String>>>) -> ValueId {
    install_labeled_recorder(fixture, log, "")
}

/// As [`install_recorder`], prefixing each entry with `label:` so several
/// requests can share one log.
pub fn install_labeled_recorder(
    fixture: &Fixture,
    log: Arc<Mutex<Vec<String>>>,
    label: &'static str,
) -> ValueId {
    let prefix = if label.is_empty() {
        String::new()
    } else {
        format!("{}:", label)
    };
    fixture
        .lane
        .submit_sync(move |context| {
            let engine = context.engine();
            engine.wrap_function(
                "recorder",
                Box::new(move |engine, args| {
                    let event = args[0];
                    let kind = engine.get_property(event, "type")?;
                    let kind: String =
                        serde_json::from_str(&engine.value_to_json(kind)?).unwrap_or_default();
                    let target = engine.get_property(event, "target")?;
                    let ready_state = engine.get_property(target, "readyState")?;
                    let ready_state = engine.value_to_json(ready_state)?;
                    log.lock()
                        .unwrap()
                        .push(format!("{}{}({})", prefix, kind, ready_state));
                    Ok(engine.undefined())
                }),
            )
        })
        .unwrap()
}

pub const ALL_EVENT_KINDS: [&str; 8] = [
    "readystatechange",
    "loadstart",
    "send",
    "progress",
    "load",
    "loadend",
    "abort",
    "error",
];

/// Builds an `XMLHttpRequest` instance with `recorder` listening to every
/// event kind; returns the script object.
pub fn new_request_with_recorder(fixture: &Fixture, recorder: ValueId) -> ValueId {
    fixture
        .lane
        .submit_sync(move |context| {
            let engine = context.engine();
            let constructor = engine
                .get_property(engine.global(), "XMLHttpRequest")
                .unwrap();
            let xhr = engine.call_function(constructor, None, &[]).unwrap();
            let add = engine.get_property(xhr, "addEventListener").unwrap();
            for kind in ALL_EVENT_KINDS {
                let name = engine
                    .value_from_json(&format!("\"{}\"", kind))
                    .unwrap();
                engine
                    .call_function(add, Some(xhr), &[name, recorder])
                    .unwrap();
            }
            xhr
        })
        .unwrap()
}

/// Invokes `object.method(args)` on the lane.
pub fn call_method(fixture: &Fixture, object: ValueId, method: &'static str, args: Vec<ValueId>) {
    fixture
        .lane
        .submit_sync(move |context| {
            let engine = context.engine();
            let function = engine.get_property(object, method).unwrap();
            engine.call_function(function, Some(object), &args).unwrap();
        })
        .unwrap()
}

/// Lowers JSON literals into engine values, on the lane.
pub fn json_args(fixture: &Fixture, literals: &'static [&'static str]) -> Vec<ValueId> {
    fixture
        .lane
        .submit_sync(move |context| {
            literals
                .iter()
                .map(|raw| context.engine().value_from_json(raw).unwrap())
                .collect()
        })
        .unwrap()
}

/// Reads `object.name` as JSON text, on the lane.
pub fn property_json(fixture: &Fixture, object: ValueId, name: &'static str) -> String {
    fixture
        .lane
        .submit_sync(move |context| {
            let engine = context.engine();
            let value = engine.get_property(object, name).unwrap();
            engine.value_to_json(value).unwrap()
        })
        .unwrap()
}

/// Waits until the log reaches `count` entries, or panics after 5s.
pub fn wait_for_events(log: &Arc<Mutex<Vec<String>>>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if log.lock().unwrap().len() >= count {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!(
        "timed out waiting for {} events; saw {:?}",
        count,
        log.lock().unwrap()
    );
}
