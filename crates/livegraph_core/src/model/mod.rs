//! Model and field declarations.

mod field;
mod schema;

pub use field::{AttrCompute, Compute, Field, FieldKind, RecordsCompute, UpdateHook};
pub use schema::{
    Cardinality, FieldInfo, FieldShape, Model, ModelDef, RelationInfo, Schema, SchemaBuilder,
};
