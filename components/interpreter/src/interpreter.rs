//! Realm orchestration.
//!
//! One [`Interpreter`] owns one realm: the engine behind its execution
//! lane, the timer subsystem, and the live-request registry. Construction
//! installs the script-visible globals; teardown releases every
//! script-side reference the polyfills hold, drops pending timers without
//! firing, and shuts the lane down with the engine still thread-affine.

use crate::executor::{CompletionExecutor, InlineExecutor};
use core_types::{decode_value, encode_json_str, parse_json_str, BridgeError};
use dispatch_queue::{ExecutionLane, LaneContext, PendingPromise};
use engine_api::{ScriptEngine, ValueId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use value_bridge::{
    attach_on_lane, call_json, call_raw, create_native_promise, exception_to_error, CallArg,
    NativeResolver,
};
use web_polyfills::{HttpRequestPolyfill, HttpTransport, TimerHub, TimerPolyfill, UreqTransport};

fn lane_closed(_: dispatch_queue::LaneError) -> BridgeError {
    BridgeError::evaluation_failed("the execution lane has shut down")
}

/// Configuration for an [`Interpreter`].
pub struct InterpreterBuilder {
    transport: Option<Arc<dyn HttpTransport>>,
    executor: Arc<dyn CompletionExecutor>,
    log_sources: bool,
}

impl InterpreterBuilder {
    fn new() -> Self {
        Self {
            transport: None,
            executor: Arc::new(InlineExecutor),
            log_sources: false,
        }
    }

    /// Replaces the network transport (default: a blocking `ureq` agent).
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the executor async completions are delivered on (default:
    /// inline on the delivering thread). Hosts with a main-thread queue
    /// install their own executor here.
    pub fn completion_executor(mut self, executor: Arc<dyn CompletionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Logs every evaluated source string at debug level.
    pub fn log_sources(mut self, enabled: bool) -> Self {
        self.log_sources = enabled;
        self
    }

    /// Spawns the realm: engine (built on the lane thread), timer hub,
    /// request registry, and the installed globals.
    pub fn build<F>(self, engine_factory: F) -> Result<Interpreter, BridgeError>
    where
        F: FnOnce() -> Box<dyn ScriptEngine> + Send + 'static,
    {
        let lane = ExecutionLane::spawn(engine_factory)
            .map_err(|e| BridgeError::evaluation_failed(e.to_string()))?;
        let hub = TimerHub::spawn()
            .map_err(|e| BridgeError::evaluation_failed(format!("timer hub: {}", e)))?;
        let timers = TimerPolyfill::new(lane.clone(), hub.clone());
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new()));
        let requests = HttpRequestPolyfill::new(lane.clone(), transport);

        let install_timers = timers.clone();
        let install_requests = requests.clone();
        lane.submit_sync(move |context| {
            install_timers.install(context)?;
            install_requests.install(context)
        })
        .map_err(lane_closed)?
        .map_err(exception_to_error)?;

        Ok(Interpreter {
            lane,
            hub,
            timers,
            requests,
            executor: self.executor,
            log_sources: self.log_sources,
        })
    }
}

/// A realm of the embedded engine, callable from any native thread.
pub struct Interpreter {
    lane: ExecutionLane,
    hub: TimerHub,
    timers: Arc<TimerPolyfill>,
    requests: Arc<HttpRequestPolyfill>,
    executor: Arc<dyn CompletionExecutor>,
    log_sources: bool,
}

impl Interpreter {
    /// Starts configuring a realm.
    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::new()
    }

    /// Builds a realm with default configuration.
    pub fn new<F>(engine_factory: F) -> Result<Interpreter, BridgeError>
    where
        F: FnOnce() -> Box<dyn ScriptEngine> + Send + 'static,
    {
        Self::builder().build(engine_factory)
    }

    /// Evaluates source on the lane and returns the completion value
    /// through the JSON interchange.
    pub fn evaluate(&self, source: &str) -> Result<JsonValue, BridgeError> {
        if self.log_sources {
            log::debug!("evaluate: {}", source);
        }
        let source = source.to_string();
        self.lane
            .submit_sync(move |context| {
                let engine = context.engine();
                let value = engine.evaluate(&source).map_err(exception_to_error)?;
                if engine.is_undefined(value) {
                    return Ok(JsonValue::Null);
                }
                let raw = engine
                    .value_to_json(value)
                    .map_err(|e| BridgeError::conversion_failed(e.message))?;
                parse_json_str(&raw)
            })
            .map_err(lane_closed)?
    }

    /// Evaluates source and keeps the raw value handle, for use as a
    /// receiver in later calls.
    pub fn evaluate_handle(&self, source: &str) -> Result<ValueId, BridgeError> {
        if self.log_sources {
            log::debug!("evaluate: {}", source);
        }
        let source = source.to_string();
        self.lane
            .submit_sync(move |context| {
                context
                    .engine()
                    .evaluate(&source)
                    .map_err(exception_to_error)
            })
            .map_err(lane_closed)?
    }

    /// Asynchronously resolves `path` against `receiver` (or the realm
    /// global), invokes it, and delivers the typed result to `completion`
    /// on the configured executor.
    pub fn call<T, F>(&self, receiver: Option<ValueId>, path: &str, args: Vec<CallArg>, completion: F)
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T, BridgeError>) + Send + 'static,
    {
        let path = path.to_string();
        let executor = self.executor.clone();
        let completion = Arc::new(Mutex::new(Some(completion)));
        let completion_in_lane = completion.clone();
        let submitted = self.lane.submit(move |context| {
            let result =
                call_json(context.engine(), receiver, &path, args).and_then(decode_value::<T>);
            if let Some(completion) = completion_in_lane.lock().take() {
                executor.execute(Box::new(move || completion(result)));
            }
        });
        if submitted.is_err() {
            if let Some(completion) = completion.lock().take() {
                let error = lane_closed(dispatch_queue::LaneError::Closed);
                self.executor.execute(Box::new(move || completion(Err(error))));
            }
        }
    }

    /// Synchronous variant of [`Interpreter::call`]; blocks the calling
    /// thread until the lane has produced the result.
    pub fn call_sync<T>(
        &self,
        receiver: Option<ValueId>,
        path: &str,
        args: Vec<CallArg>,
    ) -> Result<T, BridgeError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = path.to_string();
        self.lane
            .submit_sync(move |context| {
                call_json(context.engine(), receiver, &path, args).and_then(decode_value::<T>)
            })
            .map_err(lane_closed)?
    }

    /// Invokes a script function expected to return a promise; the result
    /// is observable through the returned settlement cell.
    pub fn call_with_promise<T>(
        &self,
        receiver: Option<ValueId>,
        path: &str,
        args: Vec<CallArg>,
    ) -> PendingPromise<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        let pending = PendingPromise::new();
        let cell = pending.clone();
        let path = path.to_string();
        let submitted = self.lane.submit(move |context| {
            match call_raw(context.engine(), receiver, &path, args) {
                Ok(value) => attach_on_lane(context, value, &cell),
                Err(error) => cell.reject(error),
            }
        });
        if submitted.is_err() {
            pending.reject(lane_closed(dispatch_queue::LaneError::Closed));
        }
        pending
    }

    /// Builds a script promise whose settlement is driven from native
    /// code; hand the handle to script via [`Interpreter::set_global_handle`].
    pub fn native_promise(&self) -> Result<(ValueId, NativeResolver), BridgeError> {
        create_native_promise(&self.lane)
    }

    /// Sets a realm global to any serializable native value.
    pub fn set_global(&self, name: &str, value: impl Serialize) -> Result<(), BridgeError> {
        let encoded = encode_json_str(&value)?;
        let name = name.to_string();
        self.lane
            .submit_sync(move |context| {
                let engine = context.engine();
                let value = engine.value_from_json(&encoded).map_err(exception_to_error)?;
                engine
                    .set_property(engine.global(), &name, value)
                    .map_err(exception_to_error)
            })
            .map_err(lane_closed)?
    }

    /// Sets a realm global to an existing value handle (e.g. a natively
    /// created promise).
    pub fn set_global_handle(&self, name: &str, value: ValueId) -> Result<(), BridgeError> {
        let name = name.to_string();
        self.lane
            .submit_sync(move |context| {
                let engine = context.engine();
                engine
                    .set_property(engine.global(), &name, value)
                    .map_err(exception_to_error)
            })
            .map_err(lane_closed)?
    }

    /// Whether `path` resolves to an invocable value.
    pub fn is_callable(&self, receiver: Option<ValueId>, path: &str) -> bool {
        let path = path.to_string();
        self.lane
            .submit_sync(move |context| {
                let engine = context.engine();
                value_bridge::resolve_path(engine, receiver, &path)
                    .map(|resolved| engine.is_callable(resolved.function))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Runs work on the lane with direct engine access. Intended for host
    /// extension installation; everything observable by script must keep
    /// going through the lane, which this enforces.
    pub fn with_lane<R, F>(&self, work: F) -> Result<R, BridgeError>
    where
        R: Send + 'static,
        F: FnOnce(&LaneContext) -> R + Send + 'static,
    {
        self.lane.submit_sync(work).map_err(lane_closed)
    }

    /// The realm's lane handle.
    pub fn lane(&self) -> &ExecutionLane {
        &self.lane
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        let timers = self.timers.clone();
        let requests = self.requests.clone();
        let torn_down = self.lane.submit_sync(move |context| {
            requests.teardown(context);
            timers.teardown(context);
        });
        if torn_down.is_err() {
            log::debug!("realm teardown skipped: lane already gone");
        }
        self.hub.shutdown();
        self.lane.shutdown();
    }
}
