//! Persistence codec.
//!
//! `persist()` produces a stable, structural JSON encoding of
//! `{snapshot, queue}`; `restore()` rebuilds the two verbatim. Local
//! fields and `$version` round-trip because they are just more entries in
//! the same wrapped structure `serde_json` already knows how to
//! (de)serialize — see [`crate::snapshot::WrappedItem`] /
//! [`crate::snapshot::WrappedObject`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RestoreError;
use crate::mutation::MutationEntry;
use crate::snapshot::StoredEntity;

/// Current persisted blob format. Bumped whenever the on-disk shape
/// changes in a way that isn't backward compatible.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedBlob {
    pub format_version: u32,
    pub snapshot: BTreeMap<String, StoredEntity>,
    pub queue: Vec<MutationEntry>,
}

/// Serialize `{snapshot, queue}` to a JSON string.
pub fn persist(snapshot: &BTreeMap<String, StoredEntity>, queue: &[MutationEntry]) -> String {
    let blob = PersistedBlob {
        format_version: FORMAT_VERSION,
        snapshot: snapshot.clone(),
        queue: queue.to_vec(),
    };
    // A `serde_json`-backed structural encoding can only fail to serialize
    // on non-string map keys or NaN/Infinity floats, neither of which this
    // crate ever produces (all keys are `String`, versions are `u64`).
    serde_json::to_string(&blob).expect("PersistedBlob is always serializable")
}

/// Deserialize a blob produced by [`persist`].
pub fn restore(blob: &str) -> Result<PersistedBlob, RestoreError> {
    let parsed: PersistedBlob = serde_json::from_str(blob)?;
    if parsed.format_version > FORMAT_VERSION {
        return Err(RestoreError::UnsupportedVersion {
            found: parsed.format_version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(parsed)
}
