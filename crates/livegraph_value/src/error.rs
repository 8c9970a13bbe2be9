//! Error types for the value crate.

use thiserror::Error;

/// Result type for value conversions and codecs.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors that can occur while converting or encoding payload values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR or JSON input.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Floating point numbers have no place in identity keys or payloads.
    #[error("float values are not supported")]
    FloatForbidden,

    /// Integer does not fit into `i64`.
    #[error("integer overflow")]
    IntegerOverflow,

    /// Unsupported input type.
    #[error("unsupported value type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },
}

impl ValueError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}
