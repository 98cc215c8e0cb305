//! Canonical serialization for deterministic hashing.
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: callers sort before hashing when order must not matter
//! - No HashMap allowed: Use BTreeMap for maps in hashed data

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::types::RecordId;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// Values that cannot be represented as JSON (maps with non-string keys)
/// hash as the empty byte string.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Order-independent hex hash of a set of record IDs.
///
/// Duplicate IDs count once.
pub fn membership_hash(ids: impl IntoIterator<Item = RecordId>) -> String {
    let mut ids: Vec<RecordId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    canonical_hash_hex(&ids)
}
