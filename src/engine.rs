//! Rebase coordinator and external engine surface.
//!
//! `Engine` owns the schema, the snapshot, the mutation queue and the
//! current client view. Every write path (`mutate`, `commit`, `rebase`)
//! that can change what's queued or what's in the snapshot funnels through
//! [`Engine::rebase_now`], which re-projects the snapshot and folds the
//! queued handlers over it in order (invariant 5).

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{EngineError, HandlerError};
use crate::id::{IdGenerator, UuidGenerator};
use crate::mutation::{Draft, MutationEntry, MutationId, MutationQueue};
use crate::persist::{self, PersistedBlob};
use crate::projector::{self, ClientState};
use crate::schema::Schema;
use crate::snapshot::{PartialUpdate, SnapshotStore, WriteMask};
use crate::time::{SystemTimeProvider, TimeProvider};

/// How to construct a fresh [`Engine`].
pub enum Init {
    /// A brand-new engine. `objects` seeds every declared singleton with its
    /// initial field values — required iff the schema declares any; a
    /// missing singleton is simply left absent (`WrappedObject::exists() ==
    /// false`) until the first complete inbound update creates it.
    New {
        objects: std::collections::BTreeMap<String, Map<String, Value>>,
    },
    /// Rebuild from a blob previously produced by [`Engine::persist`].
    Restore { data: String },
}

impl Init {
    pub fn new() -> Self {
        Init::New {
            objects: Default::default(),
        }
    }

    pub fn new_with_objects(objects: std::collections::BTreeMap<String, Map<String, Value>>) -> Self {
        Init::New { objects }
    }

    pub fn restore(data: impl Into<String>) -> Self {
        Init::Restore { data: data.into() }
    }
}

impl Default for Init {
    fn default() -> Self {
        Self::new()
    }
}

/// Options accepted by `mutate()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutateOptions {
    /// Apply the handler immediately as a one-shot effect: not enqueued,
    /// the snapshot is untouched, and the queue is never consulted.
    pub direct: bool,
}

/// Options accepted by `rebase()`.
#[derive(Debug, Clone, Copy)]
pub struct RebaseOptions {
    pub allow_server_fields: bool,
    pub allow_local_fields: bool,
    /// Skip replaying the mutation queue; instead fold the partial update's
    /// plain-value form directly onto the *current* client view, leaving
    /// `self.state` untouched by the queue. Useful when the caller knows no
    /// pending mutation should be influenced by this particular update.
    pub direct: bool,
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self {
            allow_server_fields: true,
            allow_local_fields: false,
            direct: false,
        }
    }
}

impl RebaseOptions {
    fn write_mask(&self) -> WriteMask {
        WriteMask {
            allow_server_fields: self.allow_server_fields,
            allow_local_fields: self.allow_local_fields,
        }
    }
}

/// Small, explicit set of knobs threaded through the engine rather than
/// read from global state — mirrors the source project's preference for
/// passing `max_retries`/backoff parameters explicitly through
/// `SiblingOperationQueue` instead of a config singleton.
pub struct EngineConfig {
    pub id_generator: Arc<dyn IdGenerator>,
    pub time_provider: Arc<dyn TimeProvider>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_generator: Arc::new(UuidGenerator),
            time_provider: Arc::new(SystemTimeProvider),
        }
    }
}

/// The schema-driven synchronization engine. Not `Sync`-safe by design: a
/// thread-based caller wraps it in its own mutex.
pub struct Engine {
    schema: Schema,
    snapshot: SnapshotStore,
    queue: MutationQueue,
    state: ClientState,
    config: EngineConfig,
}

impl Engine {
    /// `create(schema, init)`.
    pub fn new(schema: Schema, init: Init) -> Result<Self, EngineError> {
        Self::with_config(schema, init, EngineConfig::default())
    }

    pub fn with_config(schema: Schema, init: Init, config: EngineConfig) -> Result<Self, EngineError> {
        match init {
            Init::New { objects } => {
                let mut snapshot = SnapshotStore::new(&schema);
                if !objects.is_empty() {
                    let mut update = PartialUpdate::new();
                    for (type_name, patch) in objects {
                        update = update.with_singleton(type_name, patch);
                    }
                    snapshot.apply_partial_update(&schema, &update, WriteMask::BOTH);
                }
                let state = projector::project(&schema, &snapshot);
                Ok(Self {
                    schema,
                    snapshot,
                    queue: MutationQueue::new(),
                    state,
                    config,
                })
            }
            Init::Restore { data } => {
                let PersistedBlob { snapshot, queue, .. } = persist::restore(&data)?;
                let mut engine = Self {
                    schema,
                    snapshot: SnapshotStore::from_entities(snapshot),
                    queue: MutationQueue::from_entries(queue),
                    state: ClientState::default(),
                    config,
                };
                engine.rebase_now()?;
                Ok(engine)
            }
        }
    }

    /// `state`: current projected client view.
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// `serverState`: projection of the raw snapshot, no pending mutations
    /// applied.
    pub fn server_state(&self) -> ClientState {
        projector::project(&self.schema, &self.snapshot)
    }

    /// `pendingMutations`: queue snapshot in insertion order.
    pub fn pending_mutations(&self) -> &[MutationEntry] {
        self.queue.pending()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// `mutate(name, input, {direct?})`.
    pub fn mutate(
        &mut self,
        name: &str,
        input: Value,
        opts: MutateOptions,
    ) -> Result<Option<MutationId>, EngineError> {
        let handler = self
            .schema
            .handler(name)
            .ok_or_else(|| EngineError::handler_missing(name))?
            .clone();

        if opts.direct {
            let mut draft = Draft::new(&mut self.state);
            handler.apply(&mut draft, &input).map_err(|e| {
                EngineError::HandlerFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            tracing::trace!(mutation = name, "direct mutation applied");
            return Ok(None);
        }

        let mutation_id = self.config.id_generator.next_id();
        self.queue.push(MutationEntry {
            mutation_id: mutation_id.clone(),
            created_at: self.config.time_provider.now(),
            name: name.to_string(),
            input,
        });
        tracing::debug!(mutation_id = %mutation_id, name, "mutation enqueued");
        self.rebase_now()?;
        Ok(Some(mutation_id))
    }

    /// `commit(ids)`. Unknown ids are silently skipped (invariant 6).
    pub fn commit<I: IntoIterator<Item = MutationId>>(&mut self, ids: I) -> Result<(), EngineError> {
        if self.queue.commit(ids) {
            self.rebase_now()?;
        }
        Ok(())
    }

    /// `rebase(partialUpdate, opts)`: merge an inbound partial update into
    /// the snapshot under the given write mask, then rebase (unless
    /// `direct`, which instead folds the update's plain values straight
    /// onto the current client view without touching the snapshot or
    /// replaying the queue — a direct mode for server updates the caller
    /// knows no pending mutation should be influenced by).
    pub fn rebase(&mut self, update: &PartialUpdate, opts: RebaseOptions) -> Result<(), EngineError> {
        if opts.direct {
            apply_update_to_state(&mut self.state, update);
            return Ok(());
        }
        self.snapshot
            .apply_partial_update(&self.schema, update, opts.write_mask());
        self.rebase_now()
    }

    /// `persist()`.
    pub fn persist(&self) -> String {
        persist::persist(self.snapshot.entities(), self.queue.pending())
    }

    /// Recompute `self.state` by projecting the snapshot fresh and folding
    /// every queued handler over it in insertion order.
    ///
    /// On handler failure the fold aborts without mutating `self.state`; the
    /// caller is expected to evict the offending mutation via `commit`. The
    /// alternative design ("evict and continue") is not implemented here —
    /// see DESIGN.md.
    pub fn rebase_now(&mut self) -> Result<(), EngineError> {
        let mut next = projector::project(&self.schema, &self.snapshot);

        for entry in self.queue.pending() {
            let handler = match self.schema.handler(&entry.name) {
                Some(h) => h,
                None => {
                    // A handler that existed when the mutation was enqueued
                    // but was since dropped from the schema; treat like any
                    // other handler failure (abort, don't silently skip).
                    return Err(EngineError::rebase_failed(
                        entry.mutation_id.clone(),
                        entry.name.clone(),
                        "handler no longer registered",
                    ));
                }
            };
            let mut draft = Draft::new(&mut next);
            if let Err(e) = handler.apply(&mut draft, &entry.input) {
                tracing::warn!(
                    mutation_id = %entry.mutation_id,
                    name = %entry.name,
                    error = %e,
                    "rebase aborted: handler failed"
                );
                return Err(EngineError::rebase_failed(
                    entry.mutation_id.clone(),
                    entry.name.clone(),
                    e.to_string(),
                ));
            }
        }

        tracing::trace!(pending = self.queue.pending().len(), "rebase completed");
        self.state = next;
        Ok(())
    }
}

/// Apply a partial update's plain-value form directly to a [`ClientState`],
/// without consulting the schema's write mask or versions — used only by
/// `rebase(..., {direct: true})`, which by definition is the caller
/// asserting "I know this field subset needs no LWW/version bookkeeping,
/// just overlay it onto the view".
fn apply_update_to_state(state: &mut ClientState, update: &PartialUpdate) {
    use crate::snapshot::PartialUpdateEntry;

    for (type_name, entry) in &update.entries {
        match entry {
            PartialUpdateEntry::Collection(items) => {
                for patch in items {
                    let Some(id) = patch.get("id").and_then(Value::as_str) else {
                        continue;
                    };
                    let mut draft = Draft::new(state);
                    let merged = match draft.item_mut(type_name, id) {
                        Some(existing) => {
                            for (k, v) in patch {
                                if k == "id" {
                                    continue;
                                }
                                existing.insert(k.clone(), v.clone());
                            }
                            None
                        }
                        None => Some(patch.clone()),
                    };
                    if let Some(item) = merged {
                        draft.insert_item(type_name, id.to_string(), item);
                    }
                }
            }
            PartialUpdateEntry::Singleton(patch) => {
                let mut draft = Draft::new(state);
                match draft.object_mut(type_name) {
                    Some(existing) => {
                        for (k, v) in patch {
                            existing.insert(k.clone(), v.clone());
                        }
                    }
                    None => {
                        state
                            .types
                            .insert(type_name.clone(), crate::projector::TypeState::Object(patch.clone()));
                    }
                }
            }
        }
    }
}
