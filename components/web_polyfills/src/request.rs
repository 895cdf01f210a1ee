//! Network request polyfill.
//!
//! One in-flight HTTP request per instance, driven by the five-phase
//! ready-state lifecycle. Every observable effect — state transitions,
//! event dispatch, response population — happens on the execution lane;
//! the blocking transport call runs on a worker thread and re-enters the
//! lane with its outcome. A completion that lands after `abort()` finds
//! its cancellation token set and does nothing.

use crate::events::{self, EventKind, ListenerSet};
use crate::transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};
use dispatch_queue::{ExecutionLane, LaneContext};
use engine_api::{ScriptEngine, ScriptException, ValueId};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use url::Url;

/// The request lifecycle phases, in strict forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// `open()` has not been called yet.
    Unsent,
    /// `open()` has been called; `send()` has not.
    Opened,
    /// Headers and status are available.
    HeadersReceived,
    /// The response body is arriving.
    Loading,
    /// The operation is complete.
    Done,
}

impl ReadyState {
    /// The numeric code scripts observe via `readyState`.
    pub fn code(&self) -> u8 {
        match self {
            ReadyState::Unsent => 0,
            ReadyState::Opened => 1,
            ReadyState::HeadersReceived => 2,
            ReadyState::Loading => 3,
            ReadyState::Done => 4,
        }
    }
}

struct RequestState {
    ready_state: ReadyState,
    method: String,
    url: Option<Url>,
    request_headers: Vec<(String, String)>,
    response_headers: Vec<(String, String)>,
    listeners: ListenerSet,
    script_object: Option<ValueId>,
    in_flight: Option<Arc<AtomicBool>>,
}

impl RequestState {
    fn new() -> Self {
        Self {
            ready_state: ReadyState::Unsent,
            method: "GET".to_string(),
            url: None,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            listeners: ListenerSet::new(),
            script_object: None,
            in_flight: None,
        }
    }
}

struct Request {
    id: u64,
    state: Mutex<RequestState>,
}

struct RequestRegistry {
    next_id: u64,
    live: Vec<Weak<Request>>,
}

/// The realm's request subsystem: constructor installation, the set of
/// live requests, and the transport they share.
pub struct HttpRequestPolyfill {
    lane: ExecutionLane,
    transport: Arc<dyn HttpTransport>,
    registry: Mutex<RequestRegistry>,
    self_ref: Weak<HttpRequestPolyfill>,
}

impl HttpRequestPolyfill {
    /// Creates the subsystem for one realm.
    pub fn new(lane: ExecutionLane, transport: Arc<dyn HttpTransport>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            lane,
            transport,
            registry: Mutex::new(RequestRegistry {
                next_id: 1,
                live: Vec::new(),
            }),
            self_ref: weak.clone(),
        })
    }

    /// Installs the request constructor as a realm global. Must run on
    /// the lane.
    pub fn install(&self, context: &LaneContext) -> Result<(), ScriptException> {
        let engine = context.engine();
        let weak = self.self_ref.clone();
        let constructor = engine.wrap_function(
            "XMLHttpRequest",
            Box::new(move |engine, _| match weak.upgrade() {
                Some(polyfill) => polyfill.create_request(engine),
                None => Ok(engine.undefined()),
            }),
        );
        engine.set_property(engine.global(), "XMLHttpRequest", constructor)
    }

    /// Cancels and releases every live request. Must run on the lane.
    pub fn teardown(&self, context: &LaneContext) {
        let engine = context.engine();
        let live: Vec<Arc<Request>> = {
            let mut registry = self.registry.lock();
            registry
                .live
                .drain(..)
                .filter_map(|weak| weak.upgrade())
                .collect()
        };
        for request in live {
            let (token, listeners, object) = {
                let mut state = request.state.lock();
                (
                    state.in_flight.take(),
                    state.listeners.drain(),
                    state.script_object.take(),
                )
            };
            if let Some(token) = token {
                token.store(true, Ordering::SeqCst);
            }
            for listener in listeners {
                engine.release(listener);
            }
            if let Some(object) = object {
                engine.release(object);
            }
            log::trace!("request {}: released at teardown", request.id);
        }
    }

    /// Number of requests still tracked by the realm.
    pub fn live_requests(&self) -> usize {
        self.registry
            .lock()
            .live
            .iter()
            .filter(|weak| weak.upgrade().is_some())
            .count()
    }

    fn create_request(&self, engine: &dyn ScriptEngine) -> Result<ValueId, ScriptException> {
        let request = {
            let mut registry = self.registry.lock();
            let request = Arc::new(Request {
                id: registry.next_id,
                state: Mutex::new(RequestState::new()),
            });
            registry.next_id += 1;
            registry.live.retain(|weak| weak.upgrade().is_some());
            registry.live.push(Arc::downgrade(&request));
            request
        };

        let object = engine.value_from_json(
            r#"{"readyState":0,"status":0,"statusText":"","responseText":"","response":null,"responseType":""}"#,
        )?;
        request.state.lock().script_object = Some(object);

        type Handler = fn(
            &HttpRequestPolyfill,
            &dyn ScriptEngine,
            &Arc<Request>,
            &[ValueId],
        ) -> Result<ValueId, ScriptException>;
        let handlers: [(&str, Handler); 8] = [
            ("open", Self::handle_open),
            ("send", Self::handle_send),
            ("abort", Self::handle_abort),
            ("setRequestHeader", Self::handle_set_header),
            ("getResponseHeader", Self::handle_get_header),
            ("getAllResponseHeaders", Self::handle_all_headers),
            ("addEventListener", Self::handle_add_listener),
            ("removeEventListener", Self::handle_remove_listener),
        ];
        for (name, handler) in handlers {
            let weak = self.self_ref.clone();
            let target = request.clone();
            let function = engine.wrap_function(
                name,
                Box::new(move |engine, args| match weak.upgrade() {
                    Some(polyfill) => handler(&polyfill, engine, &target, args),
                    None => Ok(engine.undefined()),
                }),
            );
            engine.set_property(object, name, function)?;
        }
        log::debug!("request {}: created", request.id);
        Ok(object)
    }

    fn handle_open(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        {
            let mut state = request.state.lock();
            if state.in_flight.is_some() {
                log::debug!("request {}: open ignored while in flight", request.id);
                return Ok(engine.undefined());
            }
            state.method = string_arg(engine, args, 0).unwrap_or_else(|| "GET".to_string());
            let raw_url = string_arg(engine, args, 1).unwrap_or_default();
            state.url = match Url::parse(&raw_url) {
                Ok(url) => Some(url),
                Err(e) => {
                    // recorded as "no request"; the failure surfaces at send
                    log::warn!("request {}: unparsable URL `{}`: {}", request.id, raw_url, e);
                    None
                }
            };
            state.request_headers.clear();
            state.response_headers.clear();
        }
        self.set_ready_state(engine, request, ReadyState::Opened, true);
        Ok(engine.undefined())
    }

    fn handle_send(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        {
            let state = request.state.lock();
            if state.ready_state != ReadyState::Opened || state.in_flight.is_some() {
                log::debug!(
                    "request {}: send ignored in state {:?}",
                    request.id,
                    state.ready_state
                );
                return Ok(engine.undefined());
            }
        }
        self.emit(engine, request, EventKind::LoadStart);
        self.emit(engine, request, EventKind::Send);

        let prepared = {
            let mut state = request.state.lock();
            // a loadstart handler may have aborted re-entrantly
            if state.ready_state != ReadyState::Opened || state.in_flight.is_some() {
                return Ok(engine.undefined());
            }
            match state.url.clone() {
                None => None,
                Some(url) => {
                    let token = Arc::new(AtomicBool::new(false));
                    state.in_flight = Some(token.clone());
                    Some((
                        TransportRequest {
                            method: state.method.clone(),
                            url,
                            headers: state.request_headers.clone(),
                            body: string_arg(engine, args, 0),
                        },
                        token,
                    ))
                }
            }
        };

        match prepared {
            None => self.finish_with_error(engine, request, "no request to send (invalid URL)"),
            Some((transport_request, token)) => {
                log::debug!(
                    "request {}: {} {}",
                    request.id,
                    transport_request.method,
                    transport_request.url
                );
                let weak = self.self_ref.clone();
                let target = request.clone();
                let transport = self.transport.clone();
                let lane = self.lane.clone();
                let worker = std::thread::Builder::new()
                    .name("request-worker".to_string())
                    .spawn(move || {
                        let result = transport.execute(transport_request);
                        let delivered = lane.submit(move |context| {
                            if let Some(polyfill) = weak.upgrade() {
                                polyfill.complete(context.engine(), &target, &token, result);
                            }
                        });
                        if delivered.is_err() {
                            log::trace!("request completion after lane shutdown; dropped");
                        }
                    });
                if worker.is_err() {
                    request.state.lock().in_flight = None;
                    self.finish_with_error(engine, request, "could not start request worker");
                }
            }
        }
        Ok(engine.undefined())
    }

    fn handle_abort(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        _args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        let token = request.state.lock().in_flight.take();
        match token {
            Some(token) => {
                token.store(true, Ordering::SeqCst);
                log::debug!("request {}: aborted in flight", request.id);
                self.set_ready_state(engine, request, ReadyState::Done, true);
                self.emit(engine, request, EventKind::Abort);
                self.emit(engine, request, EventKind::LoadEnd);
                self.reset(engine, request);
                self.release_callbacks(engine, request);
            }
            None => self.reset(engine, request),
        }
        Ok(engine.undefined())
    }

    fn handle_set_header(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        if let (Some(name), Some(value)) =
            (string_arg(engine, args, 0), string_arg(engine, args, 1))
        {
            let mut state = request.state.lock();
            match state
                .request_headers
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
            {
                Some(existing) => existing.1 = value,
                None => state.request_headers.push((name, value)),
            }
        }
        Ok(engine.undefined())
    }

    fn handle_get_header(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        let found = string_arg(engine, args, 0).and_then(|name| {
            let state = request.state.lock();
            state
                .response_headers
                .iter()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
                .map(|(_, value)| value.clone())
        });
        match found {
            Some(value) => engine.value_from_json(&JsonValue::String(value).to_string()),
            None => engine.value_from_json("null"),
        }
    }

    fn handle_all_headers(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        _args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        let block: String = {
            let state = request.state.lock();
            state
                .response_headers
                .iter()
                .map(|(name, value)| format!("{}: {}\r\n", name, value))
                .collect()
        };
        engine.value_from_json(&JsonValue::String(block).to_string())
    }

    fn handle_add_listener(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        if let (Some(kind), Some(&callback)) = (
            string_arg(engine, args, 0).and_then(|name| EventKind::from_name(&name)),
            args.get(1),
        ) {
            if engine.is_callable(callback) {
                request.state.lock().listeners.add(engine, kind, callback);
            }
        }
        Ok(engine.undefined())
    }

    fn handle_remove_listener(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException> {
        if let (Some(kind), Some(&callback)) = (
            string_arg(engine, args, 0).and_then(|name| EventKind::from_name(&name)),
            args.get(1),
        ) {
            let removed = request.state.lock().listeners.remove(engine, kind, callback);
            for listener in removed {
                engine.release(listener);
            }
        }
        Ok(engine.undefined())
    }

    fn complete(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        token: &AtomicBool,
        result: Result<TransportResponse, TransportError>,
    ) {
        if token.load(Ordering::SeqCst) {
            // abort already handled this request
            log::debug!(
                "request {}: completion for cancelled call dropped",
                request.id
            );
            return;
        }
        request.state.lock().in_flight = None;

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                log::warn!("request {}: {}", request.id, error);
                self.finish_with_error(engine, request, &error.to_string());
                return;
            }
        };

        let object = match request.state.lock().script_object {
            Some(object) => object,
            None => return,
        };
        request.state.lock().response_headers = response.headers.clone();

        let response_type = read_string_property(engine, object, "responseType");
        let decoded = match response_type.as_deref() {
            Some("json") => serde_json::from_str::<JsonValue>(&response.body).unwrap_or_else(|e| {
                log::warn!("request {}: json response did not parse: {}", request.id, e);
                JsonValue::Null
            }),
            _ => JsonValue::String(response.body.clone()),
        };
        set_json_property(engine, object, "status", JsonValue::from(response.status));
        set_json_property(
            engine,
            object,
            "statusText",
            JsonValue::String(response.status_text.clone()),
        );
        set_json_property(
            engine,
            object,
            "responseText",
            JsonValue::String(response.body.clone()),
        );
        set_json_property(engine, object, "response", decoded);
        log::debug!(
            "request {}: completed with status {}",
            request.id,
            response.status
        );

        self.set_ready_state(engine, request, ReadyState::HeadersReceived, true);
        self.set_ready_state(engine, request, ReadyState::Loading, true);
        self.emit(engine, request, EventKind::Progress);
        self.set_ready_state(engine, request, ReadyState::Done, true);
        self.emit(engine, request, EventKind::Load);
        self.emit(engine, request, EventKind::LoadEnd);
        self.release_callbacks(engine, request);
    }

    fn finish_with_error(&self, engine: &dyn ScriptEngine, request: &Arc<Request>, message: &str) {
        log::debug!("request {}: finished with error: {}", request.id, message);
        request.state.lock().in_flight = None;
        self.set_ready_state(engine, request, ReadyState::Done, true);
        self.emit(engine, request, EventKind::Error);
        self.emit(engine, request, EventKind::LoadEnd);
        self.release_callbacks(engine, request);
    }

    fn set_ready_state(
        &self,
        engine: &dyn ScriptEngine,
        request: &Arc<Request>,
        new_state: ReadyState,
        emit: bool,
    ) {
        let (object, listeners) = {
            let mut state = request.state.lock();
            state.ready_state = new_state;
            (
                state.script_object,
                state.listeners.for_kind(EventKind::ReadyStateChange),
            )
        };
        let Some(object) = object else { return };
        set_json_property(
            engine,
            object,
            "readyState",
            JsonValue::from(new_state.code()),
        );
        if emit {
            events::emit(engine, object, &listeners, EventKind::ReadyStateChange);
        }
    }

    /// Silent reset: back to `Unsent` with status 0 and an empty response,
    /// with no ready-state notification.
    fn reset(&self, engine: &dyn ScriptEngine, request: &Arc<Request>) {
        let object = {
            let mut state = request.state.lock();
            state.ready_state = ReadyState::Unsent;
            state.response_headers.clear();
            state.script_object
        };
        let Some(object) = object else { return };
        set_json_property(engine, object, "readyState", JsonValue::from(0));
        set_json_property(engine, object, "status", JsonValue::from(0));
        set_json_property(engine, object, "statusText", JsonValue::String(String::new()));
        set_json_property(
            engine,
            object,
            "responseText",
            JsonValue::String(String::new()),
        );
        set_json_property(engine, object, "response", JsonValue::Null);
    }

    fn emit(&self, engine: &dyn ScriptEngine, request: &Arc<Request>, kind: EventKind) {
        let (object, listeners) = {
            let state = request.state.lock();
            (state.script_object, state.listeners.for_kind(kind))
        };
        if let Some(object) = object {
            events::emit(engine, object, &listeners, kind);
        }
    }

    /// Releases the script callback references held natively, the moment
    /// the request reaches a terminal phase.
    fn release_callbacks(&self, engine: &dyn ScriptEngine, request: &Arc<Request>) {
        let listeners = request.state.lock().listeners.drain();
        for listener in listeners {
            engine.release(listener);
        }
    }
}

fn string_arg(engine: &dyn ScriptEngine, args: &[ValueId], index: usize) -> Option<String> {
    let raw = engine.value_to_json(*args.get(index)?).ok()?;
    serde_json::from_str::<String>(&raw).ok()
}

fn read_string_property(engine: &dyn ScriptEngine, object: ValueId, name: &str) -> Option<String> {
    let value = engine.get_property(object, name).ok()?;
    let raw = engine.value_to_json(value).ok()?;
    serde_json::from_str::<String>(&raw).ok()
}

fn set_json_property(engine: &dyn ScriptEngine, object: ValueId, name: &str, value: JsonValue) {
    match engine.value_from_json(&value.to_string()) {
        Ok(value) => {
            if let Err(exception) = engine.set_property(object, name, value) {
                log::warn!("could not set `{}`: {}", name, exception);
            }
        }
        Err(exception) => log::warn!("could not build `{}` value: {}", name, exception),
    }
}
