//! Identifier generation abstraction.
//!
//! `ItemId`, `OperationId` and `MutationId` are opaque, collision-resistant
//! strings; the spec treats the generator that produces them as an external
//! collaborator. This mirrors [`crate::time::TimeProvider`]'s
//! production/mock pair, applied to ID generation instead of the clock.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Trait for generating opaque, collision-resistant identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh identifier, unique among all ids this generator has
    /// produced.
    fn next_id(&self) -> String;
}

/// Default production identifier generator, backed by UUIDv4.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic identifier generator for tests: produces `prefix-0`,
/// `prefix-1`, `prefix-2`, ... in call order.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_generator_produces_distinct_ids() {
        let gen = UuidGenerator;
        let a = gen.next_id();
        let b = gen.next_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn sequential_generator_is_deterministic_and_ordered() {
        let gen = SequentialIdGenerator::new("mut");
        assert_eq!(gen.next_id(), "mut-0");
        assert_eq!(gen.next_id(), "mut-1");
        assert_eq!(gen.next_id(), "mut-2");
    }
}
