//! Core error and conversion types for the embedding layer.
//!
//! This crate provides the foundational types shared by every component:
//! the error taxonomy surfaced to native callers and the typed decode pass
//! used whenever a script value crosses into native code.
//!
//! # Overview
//!
//! - [`BridgeError`] - Tagged error value delivered to native callers
//! - [`ErrorKind`] - The failure channels of the embedding layer
//! - [`decode_json_str`] / [`decode_value`] - stringify→parse→typed decode
//! - [`encode_value`] / [`encode_json_str`] - native→interchange encoding
//!
//! # Examples
//!
//! ```
//! use core_types::{decode_json_str, BridgeError, ErrorKind};
//!
//! let ok: Vec<String> = decode_json_str(r#"["a","b"]"#).unwrap();
//! assert_eq!(ok.len(), 2);
//!
//! let error = BridgeError::new(ErrorKind::NetworkError, "connection reset").with_code(0);
//! assert_eq!(error.kind, ErrorKind::NetworkError);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod convert;
mod error;

pub use convert::{decode_json_str, decode_value, encode_json_str, encode_value, parse_json_str};
pub use error::{BridgeError, ErrorKind};
