//! # LiveGraph Testkit
//!
//! Test utilities for LiveGraph.
//!
//! This crate provides:
//! - A messaging schema fixture and payload builders
//! - Property-based operation generators using proptest
//! - A reference-model harness that mirrors store operations
//! - Invariant assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use livegraph_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_messaging_store(|store| {
//!         store.insert("Message", message_payload(1, 1, "hi")).unwrap();
//!         assert_invariants(store);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod invariants;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::invariants::*;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use invariants::*;
