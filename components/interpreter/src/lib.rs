//! The embedding facade.
//!
//! This crate wires the whole embedding layer into one type per realm:
//!
//! - [`Interpreter`] - evaluate / call / promise / global operations over
//!   a serialized execution lane, callable from any native thread
//! - [`InterpreterBuilder`] - transport, completion executor, and logging
//!   configuration
//! - [`CompletionExecutor`] - the hook async completions are delivered on
//!
//! # Examples
//!
//! ```
//! use engine_api::testing::StubEngine;
//! use interpreter::Interpreter;
//!
//! let realm = Interpreter::new(|| Box::new(StubEngine::new())).unwrap();
//! let value = realm.evaluate(r#"{"ready": true}"#).unwrap();
//! assert_eq!(value["ready"], serde_json::json!(true));
//! // dropping the realm tears down timers, requests, and the engine
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod executor;
mod interpreter;

pub use executor::{CompletionExecutor, InlineExecutor};
pub use interpreter::{Interpreter, InterpreterBuilder};

// The facade's argument and result vocabulary, re-exported so hosts
// depend on one crate.
pub use core_types::{BridgeError, ErrorKind};
pub use dispatch_queue::PendingPromise;
pub use engine_api::{ScriptEngine, ValueId};
pub use value_bridge::{CallArg, NativeResolver};
