//! Canonical CBOR encoding for payloads.
//!
//! Encoding goes through `ciborium` after canonicalizing the value:
//! - map entries are sorted by their encoded key (length-first, then bytewise)
//! - integers use the shortest encoding (handled by `ciborium`)
//! - containers always carry a definite length

use crate::error::{ValueError, ValueResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Encode a value to canonical CBOR bytes.
///
/// Two values that are equal up to map entry order encode to identical bytes.
///
/// # Errors
///
/// Returns `EncodingFailed` if the underlying writer fails.
pub fn to_cbor(value: &Value) -> ValueResult<Vec<u8>> {
    let canonical = canonicalize(value)?;
    encode_raw(&canonical)
}

/// Decode a value from CBOR bytes.
///
/// # Errors
///
/// Returns `DecodingFailed` for malformed input and `FloatForbidden` if the
/// input contains floating point numbers.
pub fn from_cbor(bytes: &[u8]) -> ValueResult<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| match e {
        ciborium::de::Error::Semantic(_, msg) if msg.contains("float") => {
            ValueError::FloatForbidden
        }
        other => ValueError::decoding_failed(other.to_string()),
    })
}

fn encode_raw(value: &Value) -> ValueResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ValueError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Returns a copy of `value` with every map sorted into canonical key order.
fn canonicalize(value: &Value) -> ValueResult<Value> {
    Ok(match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(canonicalize)
                .collect::<ValueResult<_>>()?,
        ),
        Value::Map(pairs) => {
            let mut keyed = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = canonicalize(k)?;
                let encoded = encode_raw(&key)?;
                keyed.push((encoded, key, canonicalize(v)?));
            }
            keyed.sort_by(|a, b| cmp_encoded(&a.0, &b.0));
            Value::Map(keyed.into_iter().map(|(_, k, v)| (k, v)).collect())
        }
        other => other.clone(),
    })
}

fn cmp_encoded(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
