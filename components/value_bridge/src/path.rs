//! Dot-path function lookup.
//!
//! Call targets are addressed by dot-separated lookup chains (`"a.b.c"`)
//! resolved against a receiver value, or the realm global when no receiver
//! is given. Resolution is a small interpreter over the pre-split segment
//! sequence: the receiver's shape is script-defined, so there is nothing
//! to resolve statically.

use crate::exception_to_error;
use core_types::BridgeError;
use engine_api::{ScriptEngine, ValueId};

/// A resolved call target: the function value plus the receiver it was
/// found on (which becomes `this` for the invocation).
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCall {
    /// Receiver of the final segment.
    pub this: ValueId,
    /// The value the full path resolved to.
    pub function: ValueId,
}

/// Resolves a dot-separated path against `receiver` (or the realm global).
///
/// Every segment must resolve to a defined value; otherwise the resolution
/// fails with [`ErrorKind::FunctionNotFound`](core_types::ErrorKind)
/// naming the first unresolved segment.
pub fn resolve_path(
    engine: &dyn ScriptEngine,
    receiver: Option<ValueId>,
    path: &str,
) -> Result<ResolvedCall, BridgeError> {
    if path.is_empty() {
        return Err(BridgeError::function_not_found("<empty path>"));
    }
    let mut current = receiver.unwrap_or_else(|| engine.global());
    let mut this = current;
    for segment in path.split('.') {
        this = current;
        let next = engine
            .get_property(current, segment)
            .map_err(exception_to_error)?;
        if engine.is_undefined(next) {
            return Err(BridgeError::function_not_found(segment));
        }
        current = next;
    }
    Ok(ResolvedCall {
        this,
        function: current,
    })
}
