//! Error types for LiveGraph core.

use crate::types::RecordId;
use livegraph_value::ValueError;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Payload value could not be decoded or converted.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Model declarations are inconsistent.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Payload lacks a field needed to compute the identity key.
    #[error("missing identity field `{field}` for model {model}")]
    MissingIdentity {
        /// Model being resolved.
        model: String,
        /// Identity field that was absent or null.
        field: String,
    },

    /// External write attempted on a computed field.
    #[error("field {model}.{field} is computed and cannot be written")]
    ReadonlyField {
        /// Model owning the field.
        model: String,
        /// The read-only field.
        field: String,
    },

    /// A field was given a value of the wrong shape or model.
    #[error("type mismatch on {model}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Model owning the field.
        model: String,
        /// The field being written.
        field: String,
        /// What the field accepts.
        expected: String,
        /// What was supplied.
        found: String,
    },

    /// A computed field depends on itself.
    #[error("compute cycle: {}", .path.join(" -> "))]
    ComputeCycle {
        /// The nodes of the cycle, as `Model(key).field`.
        path: Vec<String>,
    },

    /// Model name is not declared in the schema.
    #[error("unknown model: {name}")]
    UnknownModel {
        /// The requested model name.
        name: String,
    },

    /// Field name is not declared on the model.
    #[error("unknown field {model}.{field}")]
    UnknownField {
        /// Model searched.
        model: String,
        /// The requested field name.
        field: String,
    },

    /// Attempt to change a field that is part of the record's identity.
    #[error("identity field {model}.{field} cannot be changed")]
    IdentityImmutable {
        /// Model owning the field.
        model: String,
        /// The identity field.
        field: String,
    },

    /// Record handle does not refer to a live record.
    #[error("record not found: {record}")]
    RecordNotFound {
        /// The stale or unknown handle.
        record: RecordId,
    },

    /// Payload has the wrong overall shape.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of the problem.
        message: String,
    },

    /// Update hooks kept producing work past the configured round limit.
    #[error("flush did not settle after {rounds} rounds")]
    FlushLimitExceeded {
        /// Rounds executed.
        rounds: usize,
    },

    /// An `on_update` hook or extension failed.
    #[error("hook {hook} failed: {source}")]
    Hook {
        /// Hook location, as `Model.field` or the extension name.
        hook: String,
        /// The underlying error.
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Creates a missing identity error.
    pub fn missing_identity(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingIdentity {
            model: model.into(),
            field: field.into(),
        }
    }

    /// Creates a read-only field error.
    pub fn readonly_field(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ReadonlyField {
            model: model.into(),
            field: field.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        model: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            model: model.into(),
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an unknown model error.
    pub fn unknown_model(name: impl Into<String>) -> Self {
        Self::UnknownModel { name: name.into() }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            model: model.into(),
            field: field.into(),
        }
    }

    /// Creates an identity immutable error.
    pub fn identity_immutable(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self::IdentityImmutable {
            model: model.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Wraps an error raised inside a hook.
    pub fn hook(hook: impl Into<String>, source: CoreError) -> Self {
        Self::Hook {
            hook: hook.into(),
            source: Box::new(source),
        }
    }

    /// Returns true for errors caused by the caller's data rather than by
    /// the model declarations.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Schema(_) | Self::ComputeCycle { .. } | Self::FlushLimitExceeded { .. }
        )
    }
}

/// Errors found while validating model declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two models share a name.
    #[error("model {model} declared twice")]
    DuplicateModel {
        /// The duplicated name.
        model: String,
    },

    /// Two fields of one model share a name.
    #[error("field {model}.{field} declared twice")]
    DuplicateField {
        /// Model name.
        model: String,
        /// The duplicated field.
        field: String,
    },

    /// Relation targets a model that is not declared.
    #[error("relation {model}.{field} targets unknown model {target}")]
    UnknownTarget {
        /// Model name.
        model: String,
        /// Relation field.
        field: String,
        /// The missing target model.
        target: String,
    },

    /// Inverse names a field that does not exist on the target.
    #[error("relation {model}.{field} names unknown inverse {inverse}")]
    UnknownInverse {
        /// Model name.
        model: String,
        /// Relation field.
        field: String,
        /// The missing inverse field.
        inverse: String,
    },

    /// Inverse field does not point back or disagrees about its partner.
    #[error("relation {model}.{field} and its inverse {inverse} do not mirror each other")]
    InverseMismatch {
        /// Model name.
        model: String,
        /// Relation field.
        field: String,
        /// The inverse field on the target model.
        inverse: String,
    },

    /// Model declares no identity fields.
    #[error("model {model} declares no identity fields")]
    MissingIdentity {
        /// Model name.
        model: String,
    },

    /// Identity field is unusable as part of a key.
    #[error("identity field {model}.{field} is invalid: {reason}")]
    InvalidIdentityField {
        /// Model name.
        model: String,
        /// The identity field.
        field: String,
        /// Why it cannot be used.
        reason: String,
    },

    /// Field combines options that do not apply to its kind.
    #[error("field {model}.{field} is invalid: {reason}")]
    InvalidFieldOption {
        /// Model name.
        model: String,
        /// The field.
        field: String,
        /// Which option is misplaced.
        reason: String,
    },
}

/// Non-fatal conditions observed during a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWarning {
    /// An unrelate found nothing to unlink.
    DanglingReference {
        /// Record owning the relation slot.
        record: RecordId,
        /// Relation field, as `Model.field`.
        field: String,
        /// The target that was not linked.
        target: RecordId,
    },
}

impl fmt::Display for StoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreWarning::DanglingReference {
                record,
                field,
                target,
            } => write!(f, "dangling reference: {field} of {record} does not hold {target}"),
        }
    }
}
