//! The script engine abstraction.
//!
//! The embedding layer never implements parsing, compilation, or garbage
//! collection; it drives an engine supplied by the host through the
//! [`ScriptEngine`] trait. Values stay inside the engine's value graph and
//! are referred to by opaque [`ValueId`] handles; the only way a value
//! crosses the boundary is through the JSON interchange surface
//! ([`ScriptEngine::value_to_json`] / [`ScriptEngine::value_from_json`]).
//!
//! An engine instance is thread-affine: it is constructed on the execution
//! lane's thread and every method is called from that thread. The `Send`
//! bound exists so the boxed engine can be moved onto the lane at spawn.

use thiserror::Error;

/// Opaque handle to a value owned by the engine's value graph.
///
/// Handles are plain identifiers and may be copied freely across threads;
/// dereferencing one is only possible through engine methods on the lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u64);

/// An exception reported by the engine while running script code.
///
/// The embedding boundary cannot propagate native panics out of engine
/// execution, so engine failures travel as values and are attached to the
/// completion delivered to native code.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ScriptException {
    /// The engine's description of the exception.
    pub message: String,
    /// Engine-provided stack description, when available.
    pub stack: Option<String>,
}

impl ScriptException {
    /// Creates an exception with a bare message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }
}

/// The script promise plus the two settlement functions, as built by
/// [`ScriptEngine::new_promise`].
#[derive(Debug, Clone, Copy)]
pub struct PromiseParts {
    /// The promise value handed to script code.
    pub promise: ValueId,
    /// Calling this function with a value fulfills the promise.
    pub resolve: ValueId,
    /// Calling this function with a value rejects the promise.
    pub reject: ValueId,
}

/// A native function invocable from script code.
///
/// The engine passes itself back in so the function body can re-enter the
/// value graph (build return values, read arguments, install callbacks).
pub type HostFunction =
    Box<dyn FnMut(&dyn ScriptEngine, &[ValueId]) -> Result<ValueId, ScriptException> + Send>;

/// The contract an embedded engine must satisfy.
///
/// Methods take `&self`: engines use interior mutability, matching the
/// thread-affine single-lane execution model (no method is ever entered
/// from two threads).
pub trait ScriptEngine: Send {
    /// Evaluates script source, returning the completion value.
    fn evaluate(&self, source: &str) -> Result<ValueId, ScriptException>;

    /// The realm's global object.
    fn global(&self) -> ValueId;

    /// The engine's `undefined` value.
    fn undefined(&self) -> ValueId;

    /// Looks up a property on a value. Absent properties resolve to
    /// [`ScriptEngine::undefined`], not an error.
    fn get_property(&self, target: ValueId, name: &str) -> Result<ValueId, ScriptException>;

    /// Writes a property on an object value.
    fn set_property(
        &self,
        target: ValueId,
        name: &str,
        value: ValueId,
    ) -> Result<(), ScriptException>;

    /// Invokes a function value with the given receiver and arguments.
    fn call_function(
        &self,
        function: ValueId,
        this: Option<ValueId>,
        args: &[ValueId],
    ) -> Result<ValueId, ScriptException>;

    /// Whether the value can be invoked.
    fn is_callable(&self, value: ValueId) -> bool;

    /// Whether the value is `undefined` (or no longer live).
    fn is_undefined(&self, value: ValueId) -> bool;

    /// Identity comparison, used for listener de-duplication.
    fn same_value(&self, a: ValueId, b: ValueId) -> bool;

    /// Wraps a native function as an invocable script value. The name is
    /// advisory (diagnostics only).
    fn wrap_function(&self, name: &str, function: HostFunction) -> ValueId;

    /// Builds a fresh promise together with its settlement functions.
    fn new_promise(&self) -> Result<PromiseParts, ScriptException>;

    /// Parses JSON text into a script value.
    fn value_from_json(&self, json: &str) -> Result<ValueId, ScriptException>;

    /// Stringifies a script value to JSON text. Non-serializable values
    /// (functions, promises) stringify as `null`.
    fn value_to_json(&self, value: ValueId) -> Result<String, ScriptException>;

    /// Runs the engine's internal follow-up queue (promise continuations)
    /// to exhaustion. The lane calls this after every submitted item.
    fn drain_microtasks(&self);

    /// Releases a native-held reference to a value.
    ///
    /// Releasing an unknown or already-released handle is a no-op: the
    /// polyfills release eagerly on terminal states and again on teardown.
    fn release(&self, value: ValueId);
}
