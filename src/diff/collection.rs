//! `ClientCollection`: pairs a server-side [`DiffStore`] with a client-view
//! `DiffStore` and a map of not-yet-confirmed local operations.
//!
//! Grounded on `operations::sibling_queue::SiblingOperationQueue`'s shape
//! (a queue of not-yet-confirmed changes, retried/evicted on conflict) —
//! generalized here from "retry a single reorder" to "track every locally
//! applied op until the server confirms or evicts it".

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

use super::store::{DiffOp, DiffStore, FieldChange, OpResult, OperationId};

/// Bookkeeping for one locally applied, not-yet-confirmed operation.
///
/// Lifecycle: `Live` until either the server echoes back the same `op_id`
/// (`Confirmed` — removed from the pending map by `apply_server_update`),
/// a rebase pass fails to reapply it (`Evicted` — removed immediately), or
/// it outlives `max_pending_age` (`Expired` — removed by the next
/// cleanup). The map entry's removal *is* the state transition; no
/// separate enum is tracked once an op leaves `Live`.
#[derive(Debug, Clone)]
pub struct PendingOp {
    pub op: DiffOp,
    pub created_at: DateTime<Utc>,
    pub last_rebase_at: DateTime<Utc>,
    /// Strictly increasing even under backward clock drift; the only thing
    /// rebase ordering relies on, never wall-clock time.
    pub order_time: i64,
}

/// Two [`DiffStore`]s (server-confirmed, and the locally rebased view) plus
/// the pending-operation map that reconciles them.
pub struct ClientCollection {
    server: DiffStore,
    view: DiffStore,
    pending: BTreeMap<OperationId, PendingOp>,
    order_counter: AtomicI64,
    max_pending_age: Duration,
}

impl ClientCollection {
    pub fn new(max_pending_age: Duration) -> Self {
        Self {
            server: DiffStore::new(),
            view: DiffStore::new(),
            pending: BTreeMap::new(),
            order_counter: AtomicI64::new(0),
            max_pending_age,
        }
    }

    pub fn view(&self) -> &DiffStore {
        &self.view
    }

    pub fn server(&self) -> &DiffStore {
        &self.server
    }

    pub fn pending(&self) -> &BTreeMap<OperationId, PendingOp> {
        &self.pending
    }

    fn next_order_time(&self) -> i64 {
        self.order_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Apply a diff to the local view; each accepted op is tracked as
    /// pending until the server confirms or a rebase evicts it.
    pub fn apply_local(&mut self, ops: &[DiffOp], now: DateTime<Utc>) -> Vec<OpResult> {
        let results = self.view.apply_diff(ops, now);
        for (op, result) in ops.iter().zip(&results) {
            if result.accepted {
                let order_time = self.next_order_time();
                self.pending.insert(
                    op.op_id().to_string(),
                    PendingOp {
                        op: op.clone(),
                        created_at: now,
                        last_rebase_at: now,
                        order_time,
                    },
                );
            }
        }
        results
    }

    /// Apply an inbound diff to the server store, confirm any pending op
    /// whose `op_id` matches, sweep expired entries, then rebase the view.
    pub fn apply_server_update(&mut self, ops: &[DiffOp], now: DateTime<Utc>) -> Vec<OpResult> {
        let results = self.server.apply_diff(ops, now);
        for op in ops {
            if self.pending.remove(op.op_id()).is_some() {
                tracing::debug!(op_id = op.op_id(), "pending op confirmed by server");
            }
        }
        self.expire_stale(now);
        self.rebase(now);
        results
    }

    /// Remove pending entries older than `max_pending_age`.
    fn expire_stale(&mut self, now: DateTime<Utc>) {
        let max_age = self.max_pending_age;
        let expired: Vec<OperationId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.signed_duration_since(p.created_at) > max_age)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.pending.remove(&id);
            tracing::debug!(op_id = %id, "pending op expired");
        }
    }

    /// Reset the view from the server store via synthetic create ops, then
    /// replay every pending op in `order_time` order. Any op that fails to
    /// reapply is evicted from the pending set immediately.
    fn rebase(&mut self, now: DateTime<Utc>) {
        let mut view = DiffStore::new();
        let synthetic: Vec<DiffOp> = self
            .server
            .items()
            .iter()
            .map(|(id, fields)| DiffOp::Create {
                op_id: format!("__server_sync__{id}"),
                id: id.clone(),
                item: fields.clone(),
            })
            .collect();
        view.apply_diff(&synthetic, now);

        let mut ordered: Vec<&mut PendingOp> = self.pending.values_mut().collect();
        ordered.sort_by_key(|p| p.order_time);

        let mut evicted = Vec::new();
        for pending in ordered {
            let result = view.apply_diff(std::slice::from_ref(&pending.op), now);
            if result[0].accepted {
                pending.last_rebase_at = now;
            } else {
                evicted.push(pending.op.op_id().to_string());
            }
        }
        for op_id in evicted {
            self.pending.remove(&op_id);
            tracing::debug!(op_id = %op_id, "pending op evicted during rebase");
        }

        self.view = view;
    }
}
