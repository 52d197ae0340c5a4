//! Schema model.
//!
//! A declarative, immutable description of the collections and singleton
//! objects a sync engine instance manages: their field kinds, whether the
//! type is versioned, and the named mutation handlers available to
//! `Engine::mutate`.
//!
//! Field values are `serde_json::Value` rather than a generic `T` — the
//! schema is data, not a set of Rust types (type-level inference is an
//! ecosystem concern the spec places out of scope), so the dynamic JSON
//! representation the rest of this crate already uses for the client view
//! and the snapshot wrapper is used here too.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::SchemaError;
use crate::mutation::MutationHandler;

/// Names no declared field may use; they are reserved for the entity
/// envelope (`id`) and the versioning metadata (`$version`).
pub const RESERVED_FIELD_NAMES: [&str; 2] = ["id", "$version"];

/// Whether a type is a keyed collection or a single standalone object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// `ItemId -> Item` keyed mapping.
    Collection,
    /// A single instance with fields only, no `id`.
    Object,
}

/// The declared kind of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Server-synchronized; participates in LWW merge and versioning.
    Regular,
    /// Client-only; server updates never overwrite it unless explicitly
    /// allowed (`WriteMask::allow_local_fields`). Always stored at
    /// snapshot version 0.
    Local { default: Value },
    /// A foreign `ItemId` (or null if `nullable`), versioned like a
    /// regular field.
    Reference { collection: String, nullable: bool },
}

impl FieldKind {
    /// Local fields are the only kind excluded from the "complete item"
    /// check and from default server-mode writes.
    pub fn is_local(&self) -> bool {
        matches!(self, FieldKind::Local { .. })
    }
}

/// Definition of a single declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn regular() -> Self {
        Self {
            kind: FieldKind::Regular,
        }
    }

    pub fn local(default: Value) -> Self {
        Self {
            kind: FieldKind::Local { default },
        }
    }

    pub fn reference(collection: impl Into<String>, nullable: bool) -> Self {
        Self {
            kind: FieldKind::Reference {
                collection: collection.into(),
                nullable,
            },
        }
    }
}

/// Declarative description of one collection or singleton type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub kind: EntityKind,
    pub fields: BTreeMap<String, FieldDef>,
    pub versioned: bool,
}

impl TypeDef {
    /// Every declared field name that is not a local field (and not
    /// reserved, though reserved names are rejected at build time).
    pub fn non_local_field_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, def)| !def.kind.is_local())
            .map(|(name, _)| name.as_str())
    }
}

/// Immutable, validated schema: type declarations plus the registered
/// mutation handlers (a mapping of mutation name to handler).
#[derive(Clone)]
pub struct Schema {
    pub(crate) types: BTreeMap<String, TypeDef>,
    pub(crate) mutations: BTreeMap<String, Arc<dyn MutationHandler>>,
}

impl Schema {
    pub fn types(&self) -> &BTreeMap<String, TypeDef> {
        &self.types
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn handler(&self, name: &str) -> Option<&Arc<dyn MutationHandler>> {
        self.mutations.get(name)
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }
}

/// Fluent builder for [`Schema`]. Consumes itself on each call, mirroring
/// the rest of this crate's preference for explicit, chainable
/// construction over a mutable "add" API.
#[derive(Default)]
pub struct SchemaBuilder {
    types: BTreeMap<String, TypeDef>,
    mutations: BTreeMap<String, Arc<dyn MutationHandler>>,
    errors: Vec<SchemaError>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a collection type (`ItemId -> Item`).
    pub fn collection(
        mut self,
        name: impl Into<String>,
        versioned: bool,
        fields: impl IntoIterator<Item = (&'static str, FieldDef)>,
    ) -> Self {
        self.add_type(name, EntityKind::Collection, versioned, fields);
        self
    }

    /// Declare a singleton object type (fields only, no `id`).
    pub fn object(
        mut self,
        name: impl Into<String>,
        versioned: bool,
        fields: impl IntoIterator<Item = (&'static str, FieldDef)>,
    ) -> Self {
        self.add_type(name, EntityKind::Object, versioned, fields);
        self
    }

    fn add_type(
        &mut self,
        name: impl Into<String>,
        kind: EntityKind,
        versioned: bool,
        fields: impl IntoIterator<Item = (&'static str, FieldDef)>,
    ) {
        let name = name.into();
        if self.types.contains_key(&name) {
            self.errors.push(SchemaError::duplicate_type(name));
            return;
        }

        let mut field_map = BTreeMap::new();
        for (field_name, def) in fields {
            if RESERVED_FIELD_NAMES.contains(&field_name) {
                self.errors
                    .push(SchemaError::reserved_field_name(name.clone(), field_name));
                continue;
            }
            field_map.insert(field_name.to_string(), def);
        }

        self.types.insert(
            name,
            TypeDef {
                kind,
                fields: field_map,
                versioned,
            },
        );
    }

    /// Register a named mutation handler.
    pub fn with_mutation(
        mut self,
        name: impl Into<String>,
        handler: impl MutationHandler + 'static,
    ) -> Self {
        let name = name.into();
        if self.mutations.contains_key(&name) {
            self.errors.push(SchemaError::duplicate_mutation(name));
        } else {
            self.mutations.insert(name, Arc::new(handler));
        }
        self
    }

    /// Validate and freeze the schema.
    ///
    /// Checks, in addition to the reserved-name and duplicate-name errors
    /// already accumulated while declaring types: every `reference(X)`
    /// field names a declared collection (not an object, and not a
    /// nonexistent type).
    pub fn build(mut self) -> Result<Schema, SchemaError> {
        for (type_name, type_def) in &self.types {
            for (field_name, field_def) in &type_def.fields {
                if let FieldKind::Reference { collection, .. } = &field_def.kind {
                    match self.types.get(collection) {
                        None => self.errors.push(SchemaError::unknown_referenced_collection(
                            type_name.clone(),
                            field_name.clone(),
                            collection.clone(),
                        )),
                        Some(target) if target.kind != EntityKind::Collection => {
                            self.errors.push(SchemaError::reference_target_not_collection(
                                type_name.clone(),
                                field_name.clone(),
                                collection.clone(),
                            ))
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        if let Some(first) = self.errors.into_iter().next() {
            return Err(first);
        }

        Ok(Schema {
            types: self.types,
            mutations: self.mutations,
        })
    }
}
