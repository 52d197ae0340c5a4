//! Top-level error types for the synchronization engine.
//!
//! Per the error-handling design, only programmer errors throw: an
//! unregistered mutation handler, a malformed persisted blob, or an invalid
//! schema. Anomalies arriving from the network (an incomplete item, an
//! unknown type, a missing `$version`) are silently dropped at the snapshot
//! layer and never surface as an [`EngineError`].

use thiserror::Error;

/// Errors raised while building a [`crate::schema::Schema`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A field used a reserved name (`id` or `$version`).
    #[error("type '{type_name}' declares a reserved field name '{field_name}'")]
    ReservedFieldName {
        type_name: String,
        field_name: String,
    },

    /// A `reference(collection)` field names a collection that was never declared.
    #[error("type '{type_name}' field '{field_name}' references unknown collection '{target}'")]
    UnknownReferencedCollection {
        type_name: String,
        field_name: String,
        target: String,
    },

    /// `withMutations` (or the builder equivalent) was called twice for the same name.
    #[error("mutation '{name}' is already registered")]
    DuplicateMutation { name: String },

    /// The same type name was declared twice.
    #[error("type '{name}' is already declared")]
    DuplicateType { name: String },

    /// A `reference` field's target collection was declared as a singleton object.
    #[error("type '{type_name}' field '{field_name}' references '{target}', which is not a collection")]
    ReferenceTargetNotCollection {
        type_name: String,
        field_name: String,
        target: String,
    },
}

impl SchemaError {
    pub fn reserved_field_name(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self::ReservedFieldName {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn unknown_referenced_collection(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::UnknownReferencedCollection {
            type_name: type_name.into(),
            field_name: field_name.into(),
            target: target.into(),
        }
    }

    pub fn duplicate_mutation(name: impl Into<String>) -> Self {
        Self::DuplicateMutation { name: name.into() }
    }

    pub fn duplicate_type(name: impl Into<String>) -> Self {
        Self::DuplicateType { name: name.into() }
    }

    pub fn reference_target_not_collection(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::ReferenceTargetNotCollection {
            type_name: type_name.into(),
            field_name: field_name.into(),
            target: target.into(),
        }
    }
}

/// Errors raised while restoring a persisted blob.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// The blob could not be parsed as the persisted structural encoding at all.
    #[error("malformed persisted blob: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The blob's `format_version` is newer than this build understands.
    #[error("unsupported persisted blob format version {found} (supports up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Errors raised by the schema-driven engine (`Engine`).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Schema construction failed (surfaced when an engine is created from
    /// a schema that was never successfully built).
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// `mutate()` named a mutation that isn't registered on the schema.
    #[error("no mutation handler registered for '{name}'")]
    HandlerMissing { name: String },

    /// `restore()` was given a blob that could not be reconstituted.
    #[error("restore failed: {0}")]
    Restore(#[from] RestoreError),

    /// A queued mutation's handler failed during a rebase pass. The rebase
    /// is aborted without mutating persisted state (spec default); the
    /// caller is expected to `commit` (evict) the offending mutation id.
    #[error("rebase aborted: mutation '{mutation_id}' ({name}) failed: {reason}")]
    RebaseFailed {
        mutation_id: String,
        name: String,
        reason: String,
    },

    /// A direct-mode mutation's handler failed. Direct mutations are never
    /// enqueued, so there is no mutation id to evict; the client view is
    /// simply left unchanged.
    #[error("direct mutation '{name}' failed: {reason}")]
    HandlerFailed { name: String, reason: String },
}

impl EngineError {
    pub fn handler_missing(name: impl Into<String>) -> Self {
        Self::HandlerMissing { name: name.into() }
    }

    pub fn rebase_failed(
        mutation_id: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RebaseFailed {
            mutation_id: mutation_id.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// An error raised by a mutation handler's business logic.
///
/// The engine does not interpret the contents of a [`HandlerError`]; it
/// only needs a `Display` implementation to build an [`EngineError::RebaseFailed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}
