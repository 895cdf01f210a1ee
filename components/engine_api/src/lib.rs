//! Script engine abstraction for the embedding layer.
//!
//! This crate defines the contract between the embedding layer and the
//! host-supplied script engine:
//!
//! - [`ScriptEngine`] - the trait the execution lane drives
//! - [`ValueId`] - opaque, copyable handles into the engine's value graph
//! - [`ScriptException`] - engine exceptions as values
//! - [`HostFunction`] - native closures invocable from script
//! - [`PromiseParts`] - a promise plus its settlement functions
//! - [`testing::StubEngine`] - a deterministic engine for tests
//!
//! # Examples
//!
//! ```
//! use engine_api::testing::StubEngine;
//! use engine_api::ScriptEngine;
//!
//! let engine = StubEngine::new();
//! let value = engine.evaluate("[1,2,3]").unwrap();
//! assert_eq!(engine.value_to_json(value).unwrap(), "[1,2,3]");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod engine;
pub mod testing;

pub use engine::{HostFunction, PromiseParts, ScriptEngine, ScriptException, ValueId};
