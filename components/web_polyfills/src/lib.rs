//! Browser-style asynchronous polyfills over the execution lane.
//!
//! The bare engine has no timers and no network; this crate installs both
//! as realm globals:
//!
//! - [`TimerPolyfill`] - `setTimeout`/`setInterval`/`clearTimeout`/
//!   `clearInterval` over a per-realm table and a shared [`TimerHub`]
//!   deadline thread
//! - [`HttpRequestPolyfill`] - an `XMLHttpRequest`-shaped constructor with
//!   the five-phase ready-state machine, header handling, response
//!   decoding, and property-slot + listener event delivery
//! - [`HttpTransport`] - the blocking network call behind the request
//!   machine ([`UreqTransport`] in production, [`testing::MockTransport`]
//!   in tests)
//!
//! Everything script-visible runs on the realm's execution lane; worker
//! threads only sleep on deadlines or block on the network and then hop
//! back onto the lane.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod events;
mod hub;
mod request;
pub mod testing;
mod timers;
mod transport;

pub use events::{EventKind, ListenerSet};
pub use hub::TimerHub;
pub use request::{HttpRequestPolyfill, ReadyState};
pub use timers::{TimerId, TimerPolyfill};
pub use transport::{
    HttpTransport, TransportError, TransportRequest, TransportResponse, UreqTransport,
};
