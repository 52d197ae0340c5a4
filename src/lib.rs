//! A client-side synchronization engine for offline-first, optimistic-UI
//! applications.
//!
//! The engine maintains two parallel views of structured data: a
//! server-authoritative [`snapshot`] with per-field version metadata, and a
//! projected client view ([`projector`]) that overlays locally-issued,
//! not-yet-confirmed mutations on top of that snapshot. When a server update
//! arrives, pending mutations are rebased on top of the refreshed snapshot by
//! the [`engine`] module, giving the UI a consistent optimistic view that
//! converges to the server's state as confirmations arrive.
//!
//! # Modules
//!
//! - [`schema`] - declarative description of collections, singletons, field
//!   kinds and versioning.
//! - [`snapshot`] - the server-authoritative store and its LWW merge.
//! - [`projector`] - pure snapshot-to-client-view projection.
//! - [`mutation`] - the pending mutation queue and handler drafts.
//! - [`engine`] - the rebase coordinator and external engine surface.
//! - [`persist`] - the `{snapshot, queue}` persistence codec.
//! - [`diff`] - an independent, lower-level create/update/delete rebaser for
//!   callers that don't need named mutation handlers (optional).
//! - [`time`] / [`id`] - injected clock and ID-generator abstractions.
//! - [`error`] - the crate's `thiserror` error types.

pub mod diff;
pub mod engine;
pub mod error;
pub mod id;
pub mod mutation;
pub mod persist;
pub mod projector;
pub mod schema;
pub mod snapshot;
pub mod time;

pub use engine::{Engine, EngineConfig, Init, MutateOptions, RebaseOptions};
pub use error::{EngineError, HandlerError, RestoreError, SchemaError};
pub use id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use mutation::{Draft, MutationEntry, MutationHandler, MutationId, MutationQueue};
pub use projector::{ClientState, TypeState};
pub use schema::{EntityKind, FieldDef, FieldKind, Schema, SchemaBuilder, TypeDef};
pub use snapshot::{FieldWrapper, PartialUpdate, SnapshotStore, StoredEntity, Version, WriteMask};
pub use time::{MockTimeProvider, SystemTimeProvider, TimeProvider};
