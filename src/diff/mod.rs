//! Low-level diff rebaser (an optional, alternative surface).
//!
//! An alternate, simpler layer for callers working with raw create/update/
//! delete operations rather than named handlers — independent of
//! [`crate::engine::Engine`] and the schema-driven snapshot/projection
//! pipeline; it does not consult [`crate::schema::Schema`] at all.

mod collection;
mod store;

pub use collection::{ClientCollection, PendingOp};
pub use store::{DiffOp, DiffStore, FieldChange, OpResult, OperationId};
