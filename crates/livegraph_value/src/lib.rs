//! # LiveGraph Value
//!
//! Dynamic payload values for the LiveGraph store.
//!
//! Network collaborators hand the store nested, partial payloads. This crate
//! provides the [`Value`] type those payloads are expressed in, plus codecs
//! for the two wire shapes the ingestion boundary accepts:
//! - canonical CBOR ([`to_cbor`], [`from_cbor`])
//! - JSON ([`from_json_str`], `TryFrom<serde_json::Value>`)
//!
//! ## Usage
//!
//! ```
//! use livegraph_value::{from_cbor, to_cbor, Value};
//!
//! let value = Value::object([("id", Value::from(42)), ("name", "Alice".into())]);
//! let bytes = to_cbor(&value).unwrap();
//! let decoded = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded.get("name"), value.get("name"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod json;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{ValueError, ValueResult};
pub use json::from_json_str;
pub use value::Value;
