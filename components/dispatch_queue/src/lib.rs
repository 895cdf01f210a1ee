//! Serialized execution for embedded script engines.
//!
//! This crate provides the scheduling half of the embedding layer:
//!
//! - [`ExecutionLane`] - one logical execution stream per realm; all
//!   script-visible work is funneled through it in FIFO order, from any
//!   native thread, with re-entrant synchronous submission and microtask
//!   draining after every item
//! - [`PendingPromise`] - the native-side settlement cell used to observe
//!   script promise results from native code
//!
//! # Examples
//!
//! ```
//! use dispatch_queue::ExecutionLane;
//! use engine_api::testing::StubEngine;
//!
//! let lane = ExecutionLane::spawn(|| Box::new(StubEngine::new())).unwrap();
//! let json = lane
//!     .submit_sync(|context| {
//!         let value = context.engine().evaluate("[1,2]").unwrap();
//!         context.engine().value_to_json(value).unwrap()
//!     })
//!     .unwrap();
//! assert_eq!(json, "[1,2]");
//! lane.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod lane;
mod pending;

pub use lane::{ExecutionLane, LaneContext, LaneError, PendingCall};
pub use pending::PendingPromise;
