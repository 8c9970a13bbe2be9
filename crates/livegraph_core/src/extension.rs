//! Store extensions.
//!
//! Extensions are registered once, in order, when the store is built. Each
//! one may rewrite insert payloads, react to record creation and veto
//! deletions for the models it applies to.

use crate::changes::Changes;
use crate::error::CoreResult;
use crate::model::Model;
use crate::store::Store;
use crate::types::RecordId;

/// Behaviour attached to a store at construction time.
///
/// All methods have no-op defaults.
///
/// ```rust,ignore
/// struct Stamp;
///
/// impl StoreExtension for Stamp {
///     fn name(&self) -> &str { "stamp" }
///
///     fn before_insert(&self, _model: &Model, changes: &mut Changes) -> CoreResult<()> {
///         if changes.get("source").is_none() {
///             changes.push("source", Change::Data("local".into()));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait StoreExtension: Send + Sync {
    /// Name used in logs and hook errors.
    fn name(&self) -> &str;

    /// Returns true if the extension handles records of `model`.
    fn applies_to(&self, _model: &Model) -> bool {
        true
    }

    /// Rewrites an insert payload before its identity is resolved.
    ///
    /// Runs for the top-level item and every nested record payload. An
    /// error aborts the whole top-level item. [`Store::resolve`] runs it
    /// too, on a copy, so lookups see the key an insert would use.
    fn before_insert(&self, _model: &Model, _changes: &mut Changes) -> CoreResult<()> {
        Ok(())
    }

    /// Runs after an insert created `record`.
    ///
    /// Mutations made here join the current batch. Errors are reported in
    /// the next flush report; the record stays.
    fn after_create(&self, _store: &mut Store, _record: RecordId) -> CoreResult<()> {
        Ok(())
    }

    /// Runs before `record` is deleted, including cascaded deletes.
    /// Records dropped because an update unlinked their identity relation
    /// are not offered to it.
    ///
    /// An error cancels the whole delete call.
    fn before_delete(&self, _store: &Store, _record: RecordId) -> CoreResult<()> {
        Ok(())
    }
}
