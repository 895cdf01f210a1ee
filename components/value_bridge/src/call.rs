//! Invocation and argument lowering.
//!
//! Native arguments cross into the engine in two shapes: plain values
//! (lowered through the JSON interchange) and native callbacks, wrapped as
//! single-use invocable script values. Results come back through the
//! generic decode pass: stringify on the engine side, parse, then typed
//! decode at the caller.

use crate::exception_to_error;
use crate::path::resolve_path;
use core_types::{decode_value, encode_value, parse_json_str, BridgeError};
use engine_api::{ScriptEngine, ValueId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A native callback receiving the script-side invocation argument after
/// the generic decode pass.
pub type NativeCallback = Box<dyn FnMut(Result<JsonValue, BridgeError>) + Send>;

/// One argument of a bridged call.
pub enum CallArg {
    /// A plain value, lowered through the JSON interchange.
    Json(JsonValue),
    /// A native callback, wrapped as a single-use invocable script value.
    Callback(NativeCallback),
}

impl CallArg {
    /// Encodes any serializable native value as an argument.
    pub fn value<T: Serialize>(value: T) -> Result<CallArg, BridgeError> {
        Ok(CallArg::Json(encode_value(&value)?))
    }

    /// Wraps an untyped native callback.
    pub fn callback(
        callback: impl FnMut(Result<JsonValue, BridgeError>) + Send + 'static,
    ) -> CallArg {
        CallArg::Callback(Box::new(callback))
    }

    /// Wraps a typed native callback; the script argument goes through the
    /// typed decode pass before delivery.
    pub fn typed_callback<T, F>(mut callback: F) -> CallArg
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(Result<T, BridgeError>) + Send + 'static,
    {
        CallArg::callback(move |result| callback(result.and_then(decode_value::<T>)))
    }
}

impl std::fmt::Debug for CallArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallArg::Json(value) => f.debug_tuple("Json").field(value).finish(),
            CallArg::Callback(_) => write!(f, "Callback {{ ... }}"),
        }
    }
}

/// Lowers native arguments into engine values.
pub fn lower_args(
    engine: &dyn ScriptEngine,
    args: Vec<CallArg>,
) -> Result<Vec<ValueId>, BridgeError> {
    args.into_iter()
        .map(|arg| match arg {
            CallArg::Json(value) => engine
                .value_from_json(&value.to_string())
                .map_err(exception_to_error),
            CallArg::Callback(callback) => Ok(wrap_callback(engine, callback)),
        })
        .collect()
}

/// Wraps a native callback as a single-use invocable script value.
///
/// The first invocation decodes the script argument and delivers it;
/// further invocations are ignored.
pub fn wrap_callback(engine: &dyn ScriptEngine, callback: NativeCallback) -> ValueId {
    let mut slot = Some(callback);
    engine.wrap_function(
        "native_callback",
        Box::new(move |engine, args| {
            match slot.take() {
                Some(mut callback) => {
                    let result = match args.first() {
                        Some(arg) => engine
                            .value_to_json(*arg)
                            .map_err(|e| BridgeError::conversion_failed(e.message))
                            .and_then(|raw| parse_json_str(&raw)),
                        None => Ok(JsonValue::Null),
                    };
                    callback(result);
                }
                None => log::debug!("single-use native callback invoked again; ignored"),
            }
            Ok(engine.undefined())
        }),
    )
}

/// Resolves `path` and invokes the target, returning the raw result value.
pub fn call_raw(
    engine: &dyn ScriptEngine,
    receiver: Option<ValueId>,
    path: &str,
    args: Vec<CallArg>,
) -> Result<ValueId, BridgeError> {
    let resolved = resolve_path(engine, receiver, path)?;
    if !engine.is_callable(resolved.function) {
        let last = path.rsplit('.').next().unwrap_or(path);
        return Err(BridgeError::function_not_found(last));
    }
    let lowered = lower_args(engine, args)?;
    engine
        .call_function(resolved.function, Some(resolved.this), &lowered)
        .map_err(exception_to_error)
}

/// Resolves, invokes, and decodes the result to the JSON interchange form.
pub fn call_json(
    engine: &dyn ScriptEngine,
    receiver: Option<ValueId>,
    path: &str,
    args: Vec<CallArg>,
) -> Result<JsonValue, BridgeError> {
    let result = call_raw(engine, receiver, path, args)?;
    if engine.is_undefined(result) {
        return Ok(JsonValue::Null);
    }
    let raw = engine
        .value_to_json(result)
        .map_err(|e| BridgeError::conversion_failed(e.message))?;
    parse_json_str(&raw)
}
