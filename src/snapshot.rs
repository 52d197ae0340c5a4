//! Server snapshot store.
//!
//! Holds, for each declared type, either a keyed mapping of wrapped items
//! (collections) or a single wrapped object (singletons). Every stored
//! field is a `{value, version}` wrapper, regardless of field kind —
//! invariant 1 of the data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{EntityKind, FieldKind, Schema};

pub type ItemId = String;
pub type Version = u64;

/// The storage form of a single field: its value plus the version it was
/// last written at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWrapper {
    pub value: Value,
    pub version: Version,
}

/// A collection item as stored in the snapshot: `id`, an optional entity
/// `$version` (present only for `versioned: true` types), and every
/// declared field wrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedItem {
    pub id: ItemId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<Version>,
    pub fields: BTreeMap<String, FieldWrapper>,
}

/// A singleton object as stored in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WrappedObject {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<Version>,
    pub fields: BTreeMap<String, FieldWrapper>,
}

impl WrappedObject {
    /// A singleton "exists" iff it has any fields set.
    pub fn exists(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// The stored form of one declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredEntity {
    Collection(BTreeMap<ItemId, WrappedItem>),
    Object(WrappedObject),
}

/// Which field kinds a partial update is allowed to write.
///
/// Replaces the spec's three-way `{server-fields, local-fields, both}`
/// enumeration with two independent booleans carrying the same
/// information; this composes directly with `Engine::rebase`'s
/// `allow_server_fields`/`allow_local_fields` options without a
/// translation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMask {
    pub allow_server_fields: bool,
    pub allow_local_fields: bool,
}

impl WriteMask {
    pub const SERVER_ONLY: Self = Self {
        allow_server_fields: true,
        allow_local_fields: false,
    };
    pub const LOCAL_ONLY: Self = Self {
        allow_server_fields: false,
        allow_local_fields: true,
    };
    pub const BOTH: Self = Self {
        allow_server_fields: true,
        allow_local_fields: true,
    };
}

impl Default for WriteMask {
    fn default() -> Self {
        Self::SERVER_ONLY
    }
}

/// One type entry in an inbound partial update payload.
#[derive(Debug, Clone)]
pub enum PartialUpdateEntry {
    /// Array of `{id, $version?, field...}` patches, applied in array order.
    Collection(Vec<Map<String, Value>>),
    /// `{$version?, field...}` patch for a singleton.
    Singleton(Map<String, Value>),
}

/// An inbound sparse update targeted at the snapshot.
#[derive(Debug, Clone, Default)]
pub struct PartialUpdate {
    pub entries: BTreeMap<String, PartialUpdateEntry>,
}

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, type_name: impl Into<String>, items: Vec<Map<String, Value>>) -> Self {
        self.entries
            .insert(type_name.into(), PartialUpdateEntry::Collection(items));
        self
    }

    pub fn with_singleton(mut self, type_name: impl Into<String>, patch: Map<String, Value>) -> Self {
        self.entries
            .insert(type_name.into(), PartialUpdateEntry::Singleton(patch));
        self
    }
}

/// Server-authoritative snapshot store.
#[derive(Clone)]
pub struct SnapshotStore {
    entities: BTreeMap<String, StoredEntity>,
}

impl SnapshotStore {
    /// Build an empty snapshot for every type declared in `schema`.
    /// `objects` seeds initial values for singletons (required iff the
    /// schema declares any; enforced by the caller, `Engine::new`, not
    /// here).
    pub fn new(schema: &Schema) -> Self {
        let mut entities = BTreeMap::new();
        for (name, type_def) in schema.types() {
            let entity = match type_def.kind {
                EntityKind::Collection => StoredEntity::Collection(BTreeMap::new()),
                EntityKind::Object => StoredEntity::Object(WrappedObject::default()),
            };
            entities.insert(name.clone(), entity);
        }
        Self { entities }
    }

    /// Rebuild a snapshot from its persisted wrapped form verbatim.
    pub fn from_entities(entities: BTreeMap<String, StoredEntity>) -> Self {
        Self { entities }
    }

    pub fn entities(&self) -> &BTreeMap<String, StoredEntity> {
        &self.entities
    }

    /// Read the stored wrapped structure for a type by reference.
    /// Callers must not mutate what is returned.
    pub fn read(&self, type_name: &str) -> Option<&StoredEntity> {
        self.entities.get(type_name)
    }

    /// Whether `item` contains every declared non-local, non-reserved
    /// field for `type_name` (and an `id`). Used to decide whether an
    /// inbound collection patch may create a new item.
    fn is_complete(schema_fields: &std::collections::BTreeMap<String, crate::schema::FieldDef>, item: &Map<String, Value>) -> bool {
        schema_fields
            .iter()
            .filter(|(_, def)| !def.kind.is_local())
            .all(|(name, _)| item.contains_key(name))
    }

    /// Apply an inbound partial update under the given write mask.
    ///
    /// Unknown type names are ignored (not an error). `$version` provided
    /// for a non-versioned type is ignored at runtime.
    pub fn apply_partial_update(&mut self, schema: &Schema, update: &PartialUpdate, mask: WriteMask) {
        for (type_name, entry) in &update.entries {
            let Some(type_def) = schema.type_def(type_name) else {
                tracing::debug!(type_name, "partial update named unknown type; ignored");
                continue;
            };

            match (entry, type_def.kind) {
                (PartialUpdateEntry::Singleton(patch), EntityKind::Object) => {
                    let Some(StoredEntity::Object(obj)) = self.entities.get_mut(type_name) else {
                        continue;
                    };
                    Self::apply_object_patch(type_def, obj, patch, mask);
                }
                (PartialUpdateEntry::Collection(items), EntityKind::Collection) => {
                    let Some(StoredEntity::Collection(map)) = self.entities.get_mut(type_name) else {
                        continue;
                    };
                    for item_patch in items {
                        let Some(id) = item_patch.get("id").and_then(Value::as_str) else {
                            continue;
                        };
                        if let Some(existing) = map.get_mut(id) {
                            Self::apply_item_patch(type_def, existing, item_patch, mask);
                        } else if mask.allow_server_fields
                            && Self::is_complete(&type_def.fields, item_patch)
                        {
                            let mut item = WrappedItem {
                                id: id.to_string(),
                                version: None,
                                fields: BTreeMap::new(),
                            };
                            Self::apply_item_patch(type_def, &mut item, item_patch, mask);
                            map.insert(id.to_string(), item);
                        }
                        // else: ignore silently (incomplete item, or server
                        // fields disallowed during creation).
                    }
                }
                _ => {
                    tracing::debug!(type_name, "partial update entity-kind mismatch; ignored");
                }
            }
        }
    }

    fn incoming_version(type_def: &crate::schema::TypeDef, patch: &Map<String, Value>) -> Version {
        if !type_def.versioned {
            return 0;
        }
        patch
            .get("$version")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    fn apply_fields(
        type_def: &crate::schema::TypeDef,
        fields: &mut BTreeMap<String, FieldWrapper>,
        patch: &Map<String, Value>,
        mask: WriteMask,
        incoming_version: Version,
    ) {
        for (field_name, field_def) in &type_def.fields {
            let Some(new_value) = patch.get(field_name) else {
                continue;
            };

            let allowed = match &field_def.kind {
                FieldKind::Local { .. } => mask.allow_local_fields,
                FieldKind::Regular | FieldKind::Reference { .. } => mask.allow_server_fields,
            };
            if !allowed {
                continue;
            }

            let write_version = if field_def.kind.is_local() { 0 } else { incoming_version };

            match fields.get(field_name) {
                Some(existing) if type_def.versioned && write_version > 0 => {
                    if write_version > existing.version {
                        fields.insert(
                            field_name.clone(),
                            FieldWrapper {
                                value: new_value.clone(),
                                version: write_version,
                            },
                        );
                    }
                    // else: stale write, keep existing (LWW tie keeps existing).
                }
                _ => {
                    fields.insert(
                        field_name.clone(),
                        FieldWrapper {
                            value: new_value.clone(),
                            version: write_version,
                        },
                    );
                }
            }
        }
    }

    fn apply_item_patch(
        type_def: &crate::schema::TypeDef,
        item: &mut WrappedItem,
        patch: &Map<String, Value>,
        mask: WriteMask,
    ) {
        let incoming_version = Self::incoming_version(type_def, patch);
        Self::apply_fields(type_def, &mut item.fields, patch, mask, incoming_version);
        if type_def.versioned && incoming_version > 0 {
            item.version = Some(item.version.unwrap_or(0).max(incoming_version));
        }
        Self::seed_local_defaults(type_def, &mut item.fields);
    }

    fn apply_object_patch(
        type_def: &crate::schema::TypeDef,
        obj: &mut WrappedObject,
        patch: &Map<String, Value>,
        mask: WriteMask,
    ) {
        // A singleton "exists" iff it has any field set. Creation requires
        // every non-local field present; otherwise the patch is ignored
        // entirely (not merged partially) when the object does not yet exist.
        if !obj.exists() {
            if !mask.allow_server_fields || !Self::is_complete(&type_def.fields, patch) {
                return;
            }
        }
        let incoming_version = Self::incoming_version(type_def, patch);
        Self::apply_fields(type_def, &mut obj.fields, patch, mask, incoming_version);
        if type_def.versioned && incoming_version > 0 {
            obj.version = Some(obj.version.unwrap_or(0).max(incoming_version));
        }
        Self::seed_local_defaults(type_def, &mut obj.fields);
    }

    /// Every declared local field is initialized from its default at
    /// version 0 the first time it is observed missing from storage
    /// (i.e. on creation, or on first patch if it somehow wasn't seeded).
    fn seed_local_defaults(type_def: &crate::schema::TypeDef, fields: &mut BTreeMap<String, FieldWrapper>) {
        for (name, def) in &type_def.fields {
            if let FieldKind::Local { default } = &def.kind {
                fields.entry(name.clone()).or_insert_with(|| FieldWrapper {
                    value: default.clone(),
                    version: 0,
                });
            }
        }
    }
}
