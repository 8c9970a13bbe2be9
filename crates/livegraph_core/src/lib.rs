//! # LiveGraph Core
//!
//! An in-memory, reactive, relational object store for client
//! applications that mirror server-side records.
//!
//! This crate provides:
//! - Identity-deduplicated records: inserting the same key twice yields the
//!   same record, merged field by field
//! - Symmetric relations: both sides of an inverse pair, and back-references
//!   for one-directional relations, are maintained together
//! - Computed fields with automatic dependency tracking and minimal,
//!   glitch-free recomputation at flush time
//! - `on_update` hooks and store extensions
//! - Batching, and a change feed notified once per flush
//! - Cascading deletes through owned relations and relation identities
//!
//! ## Usage
//!
//! ```
//! use livegraph_core::{Field, ModelDef, Schema, Store};
//! use livegraph_value::Value;
//!
//! let schema = Schema::builder()
//!     .model(
//!         ModelDef::new("Thread")
//!             .identity(["id"])
//!             .field(Field::attr("id"))
//!             .field(Field::many("messages", "Message").inverse("thread"))
//!             .field(Field::attr("size").compute(|ctx, id| {
//!                 Value::from(ctx.count(id, "messages") as i64)
//!             })),
//!     )
//!     .model(
//!         ModelDef::new("Message")
//!             .identity(["id"])
//!             .field(Field::attr("id"))
//!             .field(Field::one("thread", "Thread")),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut store = Store::new(schema);
//! let message = store
//!     .insert("Message", Value::object([("id", 1.into()), ("thread", 7.into())]))
//!     .unwrap();
//!
//! let thread = store.record(message).unwrap().related("thread").unwrap();
//! assert_eq!(thread.many("messages"), &[message]);
//! assert_eq!(thread.attr("size"), Some(&Value::from(1)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod changes;
mod compute;
mod config;
mod error;
mod extension;
mod identity;
mod insert;
mod model;
mod record;
mod relation;
mod stats;
mod store;
mod types;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeType};
pub use changes::{Change, Changes};
pub use compute::{ComputeCtx, FlushReport};
pub use config::{CyclePolicy, StoreConfig, UnknownFieldPolicy};
pub use error::{CoreError, CoreResult, SchemaError, StoreWarning};
pub use extension::StoreExtension;
pub use identity::IdentityKey;
pub use insert::{IngestFailure, IngestReport};
pub use model::{
    AttrCompute, Cardinality, Compute, Field, FieldInfo, FieldKind, FieldShape, Model, ModelDef,
    RecordsCompute, RelationInfo, Schema, SchemaBuilder, UpdateHook,
};
pub use record::{FieldValue, RecordMut, RecordRef};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{SharedStore, Store, StoreBuilder, Violation};
pub use types::{FieldId, ModelId, RecordId, SequenceNumber};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
