//! Per-item, per-field last-writer-wins store keyed by raw operation ids.
//!
//! A single timestamp comparison per field, rather than a full
//! record-level meta envelope, grounded on the same per-field conflict
//! resolution the snapshot store (`crate::snapshot`) already performs,
//! recast around raw create/update/delete operations instead of a schema.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type OperationId = String;
pub type ItemId = String;

/// A single field's value and the time it was last written, the storage
/// unit of [`DiffStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub value: Value,
    pub changed_at: DateTime<Utc>,
}

/// One raw operation, tagged with the `op_id` the caller uses to track its
/// acceptance and, for `ClientCollection`, its pending/confirmed lifecycle.
#[derive(Debug, Clone)]
pub enum DiffOp {
    Create {
        op_id: OperationId,
        id: ItemId,
        item: BTreeMap<String, FieldChange>,
    },
    Update {
        op_id: OperationId,
        id: ItemId,
        partial: BTreeMap<String, FieldChange>,
    },
    Delete {
        op_id: OperationId,
        id: ItemId,
    },
}

impl DiffOp {
    pub fn op_id(&self) -> &str {
        match self {
            DiffOp::Create { op_id, .. } => op_id,
            DiffOp::Update { op_id, .. } => op_id,
            DiffOp::Delete { op_id, .. } => op_id,
        }
    }

    pub fn item_id(&self) -> &str {
        match self {
            DiffOp::Create { id, .. } => id,
            DiffOp::Update { id, .. } => id,
            DiffOp::Delete { id, .. } => id,
        }
    }
}

/// Outcome of a single operation within a diff. Returned, never thrown —
/// the hot path between a UI and the engine must not throw on data-shape
/// issues coming from the network.
#[derive(Debug, Clone, PartialEq)]
pub struct OpResult {
    pub op_id: OperationId,
    pub accepted: bool,
    pub reason: Option<String>,
}

impl OpResult {
    fn accept(op_id: impl Into<String>) -> Self {
        Self {
            op_id: op_id.into(),
            accepted: true,
            reason: None,
        }
    }

    fn reject(op_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            op_id: op_id.into(),
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// A keyed store of items, each a map of field name to `{value,
/// changed_at}`. Applies create/update/delete operations with per-field LWW.
#[derive(Debug, Clone, Default)]
pub struct DiffStore {
    items: BTreeMap<ItemId, BTreeMap<String, FieldChange>>,
}

impl DiffStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&BTreeMap<String, FieldChange>> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn items(&self) -> &BTreeMap<ItemId, BTreeMap<String, FieldChange>> {
        &self.items
    }

    pub fn remove(&mut self, id: &str) -> Option<BTreeMap<String, FieldChange>> {
        self.items.remove(id)
    }

    /// Apply every op in `ops`, in order, against `now`. Each op is
    /// independent; one op's rejection never affects the next.
    pub fn apply_diff(&mut self, ops: &[DiffOp], now: DateTime<Utc>) -> Vec<OpResult> {
        ops.iter().map(|op| self.apply_one(op, now)).collect()
    }

    fn apply_one(&mut self, op: &DiffOp, now: DateTime<Utc>) -> OpResult {
        match op {
            DiffOp::Create { op_id, id, item } => self.create(op_id, id, item, now),
            DiffOp::Update { op_id, id, partial } => self.update(op_id, id, partial, now),
            DiffOp::Delete { op_id, id } => self.delete(op_id, id),
        }
    }

    fn create(
        &mut self,
        op_id: &str,
        id: &str,
        item: &BTreeMap<String, FieldChange>,
        now: DateTime<Utc>,
    ) -> OpResult {
        if self.items.contains_key(id) {
            return OpResult::reject(op_id, format!("item '{id}' already exists"));
        }
        let clamped: BTreeMap<String, FieldChange> = item
            .iter()
            .map(|(name, change)| {
                let changed_at = change.changed_at.min(now);
                (
                    name.clone(),
                    FieldChange {
                        value: change.value.clone(),
                        changed_at,
                    },
                )
            })
            .collect();
        self.items.insert(id.to_string(), clamped);
        OpResult::accept(op_id)
    }

    fn update(
        &mut self,
        op_id: &str,
        id: &str,
        partial: &BTreeMap<String, FieldChange>,
        now: DateTime<Utc>,
    ) -> OpResult {
        let Some(existing) = self.items.get_mut(id) else {
            return OpResult::reject(op_id, format!("item '{id}' does not exist"));
        };

        let mut changed = false;
        for (name, incoming) in partial {
            match existing.get(name) {
                Some(current) if incoming.changed_at > current.changed_at => {
                    existing.insert(name.clone(), incoming.clone());
                    changed = true;
                }
                Some(current) if incoming.changed_at == current.changed_at => {
                    if incoming.value != current.value {
                        existing.insert(
                            name.clone(),
                            FieldChange {
                                value: incoming.value.clone(),
                                changed_at: now,
                            },
                        );
                        changed = true;
                    }
                    // else: identical value at the same timestamp, nothing to do.
                }
                Some(_) => {
                    // Incoming is older than what's stored; stale, skip.
                }
                None => {
                    existing.insert(name.clone(), incoming.clone());
                    changed = true;
                }
            }
        }

        if !changed {
            return OpResult::reject(op_id, "No changes to apply");
        }
        OpResult::accept(op_id)
    }

    fn delete(&mut self, op_id: &str, id: &str) -> OpResult {
        if self.items.remove(id).is_none() {
            return OpResult::reject(op_id, format!("item '{id}' does not exist"));
        }
        OpResult::accept(op_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn change(value: Value, changed_at: DateTime<Utc>) -> FieldChange {
        FieldChange { value, changed_at }
    }

    #[test]
    fn create_rejects_existing_id() {
        let mut store = DiffStore::new();
        let now = Utc::now();
        let item: BTreeMap<_, _> = [("title".to_string(), change(json!("a"), now))].into();
        store.apply_diff(
            &[DiffOp::Create {
                op_id: "op1".into(),
                id: "x".into(),
                item: item.clone(),
            }],
            now,
        );
        let results = store.apply_diff(
            &[DiffOp::Create {
                op_id: "op2".into(),
                id: "x".into(),
                item,
            }],
            now,
        );
        assert!(!results[0].accepted);
    }

    #[test]
    fn create_clamps_future_changed_at_to_now() {
        let mut store = DiffStore::new();
        let now = Utc::now();
        let future = now + Duration::hours(1);
        let item: BTreeMap<_, _> = [("title".to_string(), change(json!("a"), future))].into();
        store.apply_diff(
            &[DiffOp::Create {
                op_id: "op1".into(),
                id: "x".into(),
                item,
            }],
            now,
        );
        assert_eq!(store.get("x").unwrap()["title"].changed_at, now);
    }

    #[test]
    fn update_rejects_missing_id() {
        let mut store = DiffStore::new();
        let now = Utc::now();
        let results = store.apply_diff(
            &[DiffOp::Update {
                op_id: "op1".into(),
                id: "missing".into(),
                partial: [("title".to_string(), change(json!("a"), now))].into(),
            }],
            now,
        );
        assert!(!results[0].accepted);
    }

    #[test]
    fn update_applies_newer_changed_at_and_skips_stale() {
        let mut store = DiffStore::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        store.apply_diff(
            &[DiffOp::Create {
                op_id: "c".into(),
                id: "x".into(),
                item: [("title".to_string(), change(json!("old"), t0))].into(),
            }],
            t0,
        );

        let stale = store.apply_diff(
            &[DiffOp::Update {
                op_id: "u1".into(),
                id: "x".into(),
                partial: [("title".to_string(), change(json!("stale"), t0 - Duration::seconds(1)))].into(),
            }],
            t1,
        );
        assert!(!stale[0].accepted);
        assert_eq!(stale[0].reason.as_deref(), Some("No changes to apply"));
        assert_eq!(store.get("x").unwrap()["title"].value, json!("old"));

        let fresh = store.apply_diff(
            &[DiffOp::Update {
                op_id: "u2".into(),
                id: "x".into(),
                partial: [("title".to_string(), change(json!("new"), t1))].into(),
            }],
            t1,
        );
        assert!(fresh[0].accepted);
        assert_eq!(store.get("x").unwrap()["title"].value, json!("new"));
    }

    #[test]
    fn update_tie_break_on_equal_timestamp_uses_now() {
        let mut store = DiffStore::new();
        let t0 = Utc::now();
        store.apply_diff(
            &[DiffOp::Create {
                op_id: "c".into(),
                id: "x".into(),
                item: [("title".to_string(), change(json!("a"), t0))].into(),
            }],
            t0,
        );

        let now = t0 + Duration::seconds(5);
        let results = store.apply_diff(
            &[DiffOp::Update {
                op_id: "u".into(),
                id: "x".into(),
                partial: [("title".to_string(), change(json!("b"), t0))].into(),
            }],
            now,
        );
        assert!(results[0].accepted);
        let stored = &store.get("x").unwrap()["title"];
        assert_eq!(stored.value, json!("b"));
        assert_eq!(stored.changed_at, now);
    }

    #[test]
    fn delete_rejects_missing_then_removes_existing() {
        let mut store = DiffStore::new();
        let now = Utc::now();
        store.apply_diff(
            &[DiffOp::Create {
                op_id: "c".into(),
                id: "x".into(),
                item: [("title".to_string(), change(json!("a"), now))].into(),
            }],
            now,
        );
        let missing = store.apply_diff(&[DiffOp::Delete { op_id: "d1".into(), id: "y".into() }], now);
        assert!(!missing[0].accepted);

        let ok = store.apply_diff(&[DiffOp::Delete { op_id: "d2".into(), id: "x".into() }], now);
        assert!(ok[0].accepted);
        assert!(!store.contains("x"));
    }

    #[test]
    fn lww_converges_regardless_of_apply_order() {
        // Two update ops with distinct changed_at values: applying them in
        // either order should leave the max-changed_at value standing.
        let t0 = Utc::now();
        let t_a = t0 + Duration::seconds(1);
        let t_b = t0 + Duration::seconds(2);

        let mut store_1 = DiffStore::new();
        store_1.apply_diff(
            &[DiffOp::Create {
                op_id: "c".into(),
                id: "x".into(),
                item: [("title".to_string(), change(json!("base"), t0))].into(),
            }],
            t0,
        );
        store_1.apply_diff(
            &[
                DiffOp::Update {
                    op_id: "u1".into(),
                    id: "x".into(),
                    partial: [("title".to_string(), change(json!("A"), t_a))].into(),
                },
                DiffOp::Update {
                    op_id: "u2".into(),
                    id: "x".into(),
                    partial: [("title".to_string(), change(json!("B"), t_b))].into(),
                },
            ],
            t_b,
        );

        let mut store_2 = DiffStore::new();
        store_2.apply_diff(
            &[DiffOp::Create {
                op_id: "c".into(),
                id: "x".into(),
                item: [("title".to_string(), change(json!("base"), t0))].into(),
            }],
            t0,
        );
        store_2.apply_diff(
            &[
                DiffOp::Update {
                    op_id: "u2".into(),
                    id: "x".into(),
                    partial: [("title".to_string(), change(json!("B"), t_b))].into(),
                },
                DiffOp::Update {
                    op_id: "u1".into(),
                    id: "x".into(),
                    partial: [("title".to_string(), change(json!("A"), t_a))].into(),
                },
            ],
            t_b,
        );

        assert_eq!(store_1.get("x").unwrap()["title"].value, json!("B"));
        assert_eq!(store_2.get("x").unwrap()["title"].value, json!("B"));
    }
}
