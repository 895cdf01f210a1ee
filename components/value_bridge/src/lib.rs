//! Native⇄script value and promise bridging.
//!
//! This crate sits between the execution lane and native callers:
//!
//! - [`resolve_path`] / [`call_json`] - dot-path lookup and invocation with
//!   the stringify→parse→typed-decode result pass
//! - [`CallArg`] - plain-value and single-use-callback arguments
//! - [`create_native_promise`] - a script promise settled from native code
//! - [`attach_promise`] - native observation of a script promise through a
//!   [`PendingPromise`](dispatch_queue::PendingPromise) cell
//!
//! All lane-side entry points take a [`LaneContext`](dispatch_queue::LaneContext)
//! or an [`ExecutionLane`](dispatch_queue::ExecutionLane); nothing here
//! touches the engine off-lane.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod call;
mod path;
mod promise;

pub use call::{call_json, call_raw, lower_args, wrap_callback, CallArg, NativeCallback};
pub use path::{resolve_path, ResolvedCall};
pub use promise::{attach_on_lane, attach_promise, create_native_promise, NativeResolver};

use core_types::BridgeError;
use engine_api::ScriptException;

/// Maps an engine exception to the error surface shown to native callers.
pub fn exception_to_error(exception: ScriptException) -> BridgeError {
    let message = match &exception.stack {
        Some(stack) => format!("{}\n{}", exception.message, stack),
        None => exception.message.clone(),
    };
    BridgeError::evaluation_failed(message)
}
