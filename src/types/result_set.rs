//! Bounded, ordered result set of disclosed duplicates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use super::classification::{Classification, RejectReason};
use super::field::FieldHandle;
use super::record::{CandidateRecord, RecordId};
use crate::canonical::membership_hash;

/// Result slots allocated up front.
const PREALLOCATED_ENTRIES: usize = 50;

/// Maximum number of accepted candidates per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCap {
    /// Stop after this many accepted candidates.
    Bounded(NonZeroUsize),
    /// Consume the whole candidate stream.
    Unbounded,
}

impl ResultCap {
    /// Interpret a configured value; anything below 1 means unbounded.
    pub fn from_config(value: i64) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(NonZeroUsize::new)
            .map_or(Self::Unbounded, Self::Bounded)
    }

    /// The bound, if any.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Bounded(n) => Some(n.get()),
            Self::Unbounded => None,
        }
    }

    /// Whether `len` accepted entries exhaust the cap.
    pub fn is_reached(&self, len: usize) -> bool {
        self.limit().is_some_and(|limit| len >= limit)
    }

    /// Initial capacity for the result buffer, never more than
    /// `PREALLOCATED_ENTRIES` whatever the cap.
    pub(crate) fn initial_capacity(&self) -> usize {
        self.limit().map_or(PREALLOCATED_ENTRIES, |n| n.min(PREALLOCATED_ENTRIES))
    }
}

impl Default for ResultCap {
    fn default() -> Self {
        Self::from_config(crate::DEFAULT_MAXIMUM_DUPLICATES)
    }
}

/// A candidate that passed classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedDuplicate {
    /// Projected record state.
    pub record: CandidateRecord,
    /// How it was accepted.
    pub classification: Classification,
}

/// Counters collected while scanning the candidate stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Candidates pulled from the source.
    pub inspected: usize,
    /// Rejections grouped by reason.
    pub rejected_by_reason: BTreeMap<RejectReason, usize>,
    /// Whether scanning stopped because the cap was reached.
    pub cap_reached: bool,
}

impl ScanStats {
    /// Total rejected candidates.
    pub fn rejected(&self) -> usize {
        self.rejected_by_reason.values().sum()
    }

    pub(crate) fn record_rejection(&mut self, reason: RejectReason) {
        *self.rejected_by_reason.entry(reason).or_insert(0) += 1;
    }
}

/// Duplicates disclosed to one actor, in acceptance order.
///
/// Created per invocation and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateResultSet {
    /// Field the sample was matched on.
    pub field: FieldHandle,
    /// Sample value that was searched for.
    pub sample: String,
    /// Maximum edit distance used.
    pub max_distance: u32,
    /// Cap in effect.
    pub cap: ResultCap,
    /// Accepted candidates.
    entries: Vec<AcceptedDuplicate>,
    /// Scan counters.
    pub stats: ScanStats,
}

impl DuplicateResultSet {
    pub(crate) fn new(field: FieldHandle, sample: String, max_distance: u32, cap: ResultCap) -> Self {
        Self {
            field,
            sample,
            max_distance,
            entries: Vec::with_capacity(cap.initial_capacity()),
            cap,
            stats: ScanStats::default(),
        }
    }

    pub(crate) fn push(&mut self, record: CandidateRecord, classification: Classification) {
        self.entries.push(AcceptedDuplicate { record, classification });
    }

    /// Whether another entry may still be accepted.
    pub fn is_full(&self) -> bool {
        self.cap.is_reached(self.entries.len())
    }

    /// Number of accepted candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no duplicates are visible.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accepted candidates in acceptance order.
    pub fn entries(&self) -> &[AcceptedDuplicate] {
        &self.entries
    }

    /// Iterate over accepted records.
    pub fn records(&self) -> impl Iterator<Item = &CandidateRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Accepted record IDs in acceptance order.
    pub fn record_ids(&self) -> Vec<RecordId> {
        self.records().map(|r| r.id).collect()
    }

    /// Whether a record was accepted.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.entries.iter().any(|e| e.record.id == *id)
    }

    /// Order-independent hash of the accepted IDs.
    ///
    /// Two scans over the same store state and actor yield the same
    /// fingerprint even when the source delivers in a different order.
    pub fn membership_fingerprint(&self) -> String {
        membership_hash(self.records().map(|r| r.id))
    }

    /// Consume into the accepted entries.
    pub fn into_entries(self) -> Vec<AcceptedDuplicate> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a DuplicateResultSet {
    type Item = &'a AcceptedDuplicate;
    type IntoIter = std::slice::Iter<'a, AcceptedDuplicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
