//! State projector.
//!
//! A pure function from snapshot to client view: wrappers are replaced by
//! their plain values, `$version` is preserved verbatim when present, and
//! no validation is performed (the snapshot's invariants already hold).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::schema::{EntityKind, Schema};
use crate::snapshot::{SnapshotStore, StoredEntity};

pub type ItemId = String;

/// The projected state of one declared type: a plain, unwrapped view.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeState {
    Collection(BTreeMap<ItemId, Map<String, Value>>),
    Object(Map<String, Value>),
}

impl TypeState {
    pub fn as_collection(&self) -> Option<&BTreeMap<ItemId, Map<String, Value>>> {
        match self {
            TypeState::Collection(map) => Some(map),
            TypeState::Object(_) => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut BTreeMap<ItemId, Map<String, Value>>> {
        match self {
            TypeState::Collection(map) => Some(map),
            TypeState::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            TypeState::Object(obj) => Some(obj),
            TypeState::Collection(_) => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match self {
            TypeState::Object(obj) => Some(obj),
            TypeState::Collection(_) => None,
        }
    }
}

/// The projected client view: every pending mutation's effects folded over
/// a fresh projection of the snapshot. Plain values only — wrappers never
/// leak into this structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    pub types: BTreeMap<String, TypeState>,
}

impl ClientState {
    pub fn collection(&self, type_name: &str) -> Option<&BTreeMap<ItemId, Map<String, Value>>> {
        self.types.get(type_name).and_then(TypeState::as_collection)
    }

    pub fn object(&self, type_name: &str) -> Option<&Map<String, Value>> {
        self.types.get(type_name).and_then(TypeState::as_object)
    }

    pub fn item(&self, type_name: &str, id: &str) -> Option<&Map<String, Value>> {
        self.collection(type_name)?.get(id)
    }
}

fn unwrap_fields(fields: &BTreeMap<String, crate::snapshot::FieldWrapper>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, wrapper)| (name.clone(), wrapper.value.clone()))
        .collect()
}

/// Project a snapshot into a plain client view. Pure: takes no mutable
/// state and has no side effects.
pub fn project(schema: &Schema, snapshot: &SnapshotStore) -> ClientState {
    let mut types = BTreeMap::new();

    for (type_name, type_def) in schema.types() {
        let Some(entity) = snapshot.read(type_name) else {
            continue;
        };

        let projected = match (type_def.kind, entity) {
            (EntityKind::Collection, StoredEntity::Collection(items)) => {
                let mut map = BTreeMap::new();
                for (id, wrapped) in items {
                    let mut obj = unwrap_fields(&wrapped.fields);
                    obj.insert("id".to_string(), Value::String(id.clone()));
                    if let Some(v) = wrapped.version {
                        obj.insert("$version".to_string(), Value::from(v));
                    }
                    map.insert(id.clone(), obj);
                }
                TypeState::Collection(map)
            }
            (EntityKind::Object, StoredEntity::Object(wrapped)) => {
                let mut obj = unwrap_fields(&wrapped.fields);
                if let Some(v) = wrapped.version {
                    obj.insert("$version".to_string(), Value::from(v));
                }
                TypeState::Object(obj)
            }
            _ => continue,
        };

        types.insert(type_name.clone(), projected);
    }

    ClientState { types }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use crate::snapshot::{PartialUpdate, WriteMask};
    use serde_json::json;

    #[test]
    fn project_unwraps_fields_and_preserves_version() {
        let schema = Schema::builder()
            .collection("todos", true, [("title", FieldDef::regular())])
            .build()
            .unwrap();
        let mut snap = SnapshotStore::new(&schema);
        let update = PartialUpdate::new().with_collection(
            "todos",
            vec![[
                ("id".to_string(), json!("a")),
                ("$version".to_string(), json!(5)),
                ("title".to_string(), json!("hi")),
            ]
            .into_iter()
            .collect()],
        );
        snap.apply_partial_update(&schema, &update, WriteMask::SERVER_ONLY);

        let state = project(&schema, &snap);
        let item = state.item("todos", "a").unwrap();
        assert_eq!(item["title"], json!("hi"));
        assert_eq!(item["$version"], json!(5));
        assert_eq!(item["id"], json!("a"));
    }

    #[test]
    fn project_omits_dollar_version_for_unversioned_type() {
        let schema = Schema::builder()
            .collection("tags", false, [("name", FieldDef::regular())])
            .build()
            .unwrap();
        let mut snap = SnapshotStore::new(&schema);
        let update = PartialUpdate::new().with_collection(
            "tags",
            vec![[("id".to_string(), json!("t")), ("name".to_string(), json!("x"))]
                .into_iter()
                .collect()],
        );
        snap.apply_partial_update(&schema, &update, WriteMask::SERVER_ONLY);

        let state = project(&schema, &snap);
        let item = state.item("tags", "t").unwrap();
        assert!(!item.contains_key("$version"));
    }
}
