//! Mutation registry & queue.
//!
//! The registry is `Schema::handler` (an immutable `name -> handler` map);
//! this module owns the queue of pending entries and the `Draft` handlers
//! mutate during a rebase pass.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::projector::{ClientState, TypeState};

pub type MutationId = String;

/// A handler registered under a mutation name. Mutates a `Draft` of the
/// client view in place and may fail with a business-rule violation.
///
/// Implementations must not retain the `Draft` beyond the call — the
/// borrow's lifetime enforces this, so the spec's "draft is invalid after
/// the fold step returns" invariant holds by construction, not convention.
pub trait MutationHandler: Send + Sync {
    fn apply(&self, draft: &mut Draft<'_>, input: &Value) -> Result<(), HandlerError>;
}

/// Blanket impl so a plain closure can be registered directly with
/// `SchemaBuilder::with_mutation`.
impl<F> MutationHandler for F
where
    F: Fn(&mut Draft<'_>, &Value) -> Result<(), HandlerError> + Send + Sync,
{
    fn apply(&self, draft: &mut Draft<'_>, input: &Value) -> Result<(), HandlerError> {
        self(draft, input)
    }
}

/// A mutable view over the client state a handler is folded into.
///
/// `Deref`/`DerefMut` expose the full [`ClientState`] for reading; the
/// methods below cover the common per-item write patterns (insert,
/// update-in-place, remove) a mutation handler performs (`draft.todos[id] =
/// {...}`, toggling a field, deleting a key).
pub struct Draft<'a> {
    state: &'a mut ClientState,
}

impl<'a> Draft<'a> {
    pub fn new(state: &'a mut ClientState) -> Self {
        Self { state }
    }

    /// Insert or replace an item in a collection, creating the collection
    /// if the type hadn't been projected yet (e.g. an as-yet-empty type).
    pub fn insert_item(&mut self, type_name: &str, id: impl Into<String>, item: Map<String, Value>) {
        let entry = self
            .state
            .types
            .entry(type_name.to_string())
            .or_insert_with(|| TypeState::Collection(BTreeMap::new()));
        if let TypeState::Collection(map) = entry {
            map.insert(id.into(), item);
        }
    }

    /// Remove an item from a collection. This is the only "deletion"
    /// surface the engine exposes; the snapshot itself defines no delete
    /// operation.
    pub fn remove_item(&mut self, type_name: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .types
            .get_mut(type_name)
            .and_then(TypeState::as_collection_mut)
            .and_then(|map| map.remove(id))
    }

    /// Mutable access to a single item, for in-place field edits.
    pub fn item_mut(&mut self, type_name: &str, id: &str) -> Option<&mut Map<String, Value>> {
        self.state
            .types
            .get_mut(type_name)
            .and_then(TypeState::as_collection_mut)
            .and_then(|map| map.get_mut(id))
    }

    /// Mutable access to a singleton object's fields.
    pub fn object_mut(&mut self, type_name: &str) -> Option<&mut Map<String, Value>> {
        self.state
            .types
            .get_mut(type_name)
            .and_then(TypeState::as_object_mut)
    }
}

impl<'a> Deref for Draft<'a> {
    type Target = ClientState;
    fn deref(&self) -> &ClientState {
        self.state
    }
}

impl<'a> DerefMut for Draft<'a> {
    fn deref_mut(&mut self) -> &mut ClientState {
        self.state
    }
}

/// One entry in the pending mutation queue.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MutationEntry {
    pub mutation_id: MutationId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub input: Value,
}

/// Insertion-ordered queue of pending mutations (invariant 5: totally
/// ordered by insertion, rebase applies handlers in that order).
#[derive(Debug, Clone, Default)]
pub struct MutationQueue {
    entries: Vec<MutationEntry>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<MutationEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: MutationEntry) {
        self.entries.push(entry);
    }

    /// Remove matching entries; returns whether anything was removed, so
    /// the caller knows whether a rebase needs to be triggered. Unknown
    /// ids are silently skipped (invariant 6).
    pub fn commit<I: IntoIterator<Item = MutationId>>(&mut self, ids: I) -> bool {
        let ids: std::collections::HashSet<MutationId> = ids.into_iter().collect();
        if ids.is_empty() {
            return false;
        }
        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.mutation_id));
        self.entries.len() != before
    }

    pub fn pending(&self) -> &[MutationEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
