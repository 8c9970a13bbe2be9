//! Field change sets.
//!
//! `Changes` is what `insert` and `update` consume. A wire payload map
//! becomes a `Changes` of [`Change::Data`] entries; typed callers can also
//! name already-resolved records directly.

use crate::error::{CoreError, CoreResult};
use crate::types::RecordId;
use livegraph_value::Value;

/// One requested change to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Wire data: an attribute value, or a relation payload (nested record,
    /// bare key, list, command list or null).
    Data(Value),
    /// Point a `one` relation at a record, or add it to a `many` relation.
    Link(RecordId),
    /// Remove one record from a relation.
    Unlink(RecordId),
    /// Add records to a `many` relation.
    Add(Vec<RecordId>),
    /// Remove records from a `many` relation.
    Remove(Vec<RecordId>),
    /// Replace the contents of a `many` relation, in this order.
    Replace(Vec<RecordId>),
    /// Empty the relation.
    Clear,
}

impl Change {
    /// Short description used in type mismatch errors.
    pub fn describe(&self) -> String {
        match self {
            Change::Data(value) => value.type_name().to_string(),
            Change::Link(_) | Change::Unlink(_) => "a record handle".to_string(),
            Change::Add(_) | Change::Remove(_) | Change::Replace(_) => {
                "a list of record handles".to_string()
            }
            Change::Clear => "clear".to_string(),
        }
    }
}

/// An ordered list of field changes.
///
/// ```rust,ignore
/// let changes = Changes::new()
///     .set("body", "hello")
///     .link("author", persona)
///     .add("reactions", [thumbs_up]);
/// store.update(message, changes)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    entries: Vec<(String, Change)>,
}

impl Changes {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a payload map into data changes, keeping key order.
    ///
    /// # Errors
    ///
    /// `InvalidPayload` if `value` is not a map with text keys.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let Some(pairs) = value.as_map() else {
            return Err(CoreError::invalid_payload(format!(
                "expected a map of fields, found {}",
                value.type_name()
            )));
        };
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, v) in pairs {
            let Some(name) = key.as_text() else {
                return Err(CoreError::invalid_payload(format!(
                    "field names must be text, found {}",
                    key.type_name()
                )));
            };
            entries.push((name.to_string(), Change::Data(v.clone())));
        }
        Ok(Self { entries })
    }

    /// Appends a change.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, change: Change) -> Self {
        self.push(field, change);
        self
    }

    /// Appends a change in place.
    pub fn push(&mut self, field: impl Into<String>, change: Change) {
        self.entries.push((field.into(), change));
    }

    /// Assigns wire data to a field.
    #[must_use]
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Change::Data(value.into()))
    }

    /// Links a record.
    #[must_use]
    pub fn link(self, field: impl Into<String>, record: RecordId) -> Self {
        self.with(field, Change::Link(record))
    }

    /// Unlinks a record.
    #[must_use]
    pub fn unlink(self, field: impl Into<String>, record: RecordId) -> Self {
        self.with(field, Change::Unlink(record))
    }

    /// Adds records to a `many` relation.
    #[must_use]
    pub fn add(self, field: impl Into<String>, records: impl IntoIterator<Item = RecordId>) -> Self {
        self.with(field, Change::Add(records.into_iter().collect()))
    }

    /// Removes records from a `many` relation.
    #[must_use]
    pub fn remove(
        self,
        field: impl Into<String>,
        records: impl IntoIterator<Item = RecordId>,
    ) -> Self {
        self.with(field, Change::Remove(records.into_iter().collect()))
    }

    /// Replaces a `many` relation.
    #[must_use]
    pub fn replace(
        self,
        field: impl Into<String>,
        records: impl IntoIterator<Item = RecordId>,
    ) -> Self {
        self.with(field, Change::Replace(records.into_iter().collect()))
    }

    /// Clears a relation.
    #[must_use]
    pub fn clear(self, field: impl Into<String>) -> Self {
        self.with(field, Change::Clear)
    }

    /// Returns the last change requested for `field`.
    pub fn get(&self, field: &str) -> Option<&Change> {
        self.entries
            .iter()
            .rev()
            .find(|(name, _)| name == field)
            .map(|(_, change)| change)
    }

    /// Removes every change for `field`, returning the last one.
    pub fn take(&mut self, field: &str) -> Option<Change> {
        let mut taken = None;
        self.entries.retain(|(name, change)| {
            if name == field {
                taken = Some(change.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    /// Iterates over the changes in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.entries.iter().map(|(name, change)| (name.as_str(), change))
    }

    /// Returns the number of changes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
