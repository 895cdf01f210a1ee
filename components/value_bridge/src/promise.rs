//! Native⇄script promise bridging.
//!
//! Two directions:
//!
//! - [`create_native_promise`] builds a script promise whose settlement is
//!   driven from native code, from any thread, by re-entering the lane.
//! - [`attach_promise`] observes a script promise from native code through
//!   a [`PendingPromise`] cell. Reactions are registered immediately and
//!   unconditionally — the lane may already have advanced past the point
//!   where the promise settled by the time native code asks to observe it,
//!   and the engine's `then` contract is what guarantees no settlement is
//!   missed either way.

use crate::exception_to_error;
use core_types::{decode_json_str, BridgeError, ErrorKind};
use dispatch_queue::{ExecutionLane, LaneContext, PendingPromise};
use engine_api::{ScriptEngine, ValueId};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Settles a natively-created script promise from any thread.
///
/// The resolver captures just enough to re-enter the lane; invoking it off
/// the lane is always safe. Settlement after lane shutdown is quietly
/// dropped.
#[derive(Clone)]
pub struct NativeResolver {
    lane: ExecutionLane,
    resolve_fn: ValueId,
    reject_fn: ValueId,
}

impl NativeResolver {
    /// Fulfills the promise with the given arguments.
    pub fn resolve(&self, args: Vec<JsonValue>) {
        self.settle(self.resolve_fn, args);
    }

    /// Rejects the promise with a tagged error payload.
    pub fn reject(&self, kind: ErrorKind, message: &str) {
        let payload = serde_json::json!({
            "type": kind.as_str(),
            "message": message,
        });
        self.settle(self.reject_fn, vec![payload]);
    }

    fn settle(&self, settle_fn: ValueId, args: Vec<JsonValue>) {
        let outcome = self.lane.submit(move |context| {
            let engine = context.engine();
            let lowered: Result<Vec<ValueId>, _> = args
                .iter()
                .map(|value| engine.value_from_json(&value.to_string()))
                .collect();
            let result =
                lowered.and_then(|ids| engine.call_function(settle_fn, None, &ids));
            if let Err(exception) = result {
                log::warn!("native promise settlement failed: {}", exception);
            }
        });
        if outcome.is_err() {
            log::debug!("native promise settled after lane shutdown; dropped");
        }
    }
}

/// Builds a script promise resolvable from native code.
///
/// Runs synchronously through the lane and returns the script promise
/// handle (for handing to script code) plus the native resolver.
pub fn create_native_promise(
    lane: &ExecutionLane,
) -> Result<(ValueId, NativeResolver), BridgeError> {
    let parts = lane
        .submit_sync(|context| context.engine().new_promise())
        .map_err(|e| BridgeError::evaluation_failed(e.to_string()))?
        .map_err(exception_to_error)?;
    Ok((
        parts.promise,
        NativeResolver {
            lane: lane.clone(),
            resolve_fn: parts.resolve,
            reject_fn: parts.reject,
        },
    ))
}

/// Attaches native observation to a script promise value.
///
/// Registration is submitted to the lane immediately; the returned cell
/// settles exactly once whether the promise settles before or after the
/// observer attaches. A value without a callable `then` settles the cell
/// with [`ErrorKind::PromiseReturnedEmpty`].
pub fn attach_promise<T>(lane: &ExecutionLane, promise: ValueId) -> PendingPromise<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    let pending = PendingPromise::new();
    let cell = pending.clone();
    let outcome = lane.submit(move |context| attach_on_lane(context, promise, &cell));
    if outcome.is_err() {
        pending.reject(BridgeError::new(
            ErrorKind::PromiseFailed,
            "execution lane unavailable",
        ));
    }
    pending
}

/// Lane-side half of [`attach_promise`], usable directly from inside a
/// lane item that already holds the result value.
pub fn attach_on_lane<T>(context: &LaneContext, promise: ValueId, pending: &PendingPromise<T>)
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    let engine = context.engine();
    let then = match engine.get_property(promise, "then") {
        Ok(value) => value,
        Err(exception) => {
            pending.reject(exception_to_error(exception));
            return;
        }
    };
    if !engine.is_callable(then) {
        pending.reject(BridgeError::new(
            ErrorKind::PromiseReturnedEmpty,
            "call result is not a thenable",
        ));
        return;
    }

    let fulfilled_cell = pending.clone();
    let on_fulfilled = engine.wrap_function(
        "bridge_on_fulfilled",
        Box::new(move |engine, args| {
            match decode_first_arg::<T>(engine, args) {
                Ok(value) => fulfilled_cell.resolve(value),
                Err(error) => fulfilled_cell.reject(error),
            }
            Ok(engine.undefined())
        }),
    );
    let rejected_cell = pending.clone();
    let on_rejected = engine.wrap_function(
        "bridge_on_rejected",
        Box::new(move |engine, args| {
            let reason = args
                .first()
                .and_then(|arg| engine.value_to_json(*arg).ok())
                .unwrap_or_else(|| "null".to_string());
            rejected_cell.reject(BridgeError::new(
                ErrorKind::PromiseFailed,
                format!("promise rejected: {}", reason),
            ));
            Ok(engine.undefined())
        }),
    );

    if let Err(exception) = engine.call_function(then, Some(promise), &[on_fulfilled, on_rejected])
    {
        pending.reject(exception_to_error(exception));
    }
}

fn decode_first_arg<T: DeserializeOwned>(
    engine: &dyn ScriptEngine,
    args: &[ValueId],
) -> Result<T, BridgeError> {
    match args.first() {
        Some(arg) => {
            let raw = engine
                .value_to_json(*arg)
                .map_err(|e| BridgeError::conversion_failed(e.message))?;
            decode_json_str(&raw)
        }
        None => decode_json_str("null"),
    }
}
