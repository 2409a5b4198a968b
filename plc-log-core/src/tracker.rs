//! Change detection
//!
//! Compares each poll's samples against the last-seen values and emits only
//! the tags whose value changed. Samples are paired by position: the tag
//! source returns the same tag order on every read.

use crate::types::{ChangeRecord, Sample, TagValue, Timestamp};

/// Last-seen value per tracked tag
///
/// `None` means "unknown": nothing has been seen yet, so the next value is
/// always reported, whatever it is (including `TagValue::Null`).
pub type TrackerState = Vec<Option<TagValue>>;

/// Pure diff of one poll cycle
///
/// Returns the changed records (in input order) and the new previous-value
/// state. Positions beyond the shorter of the two inputs are ignored.
pub fn diff(
    previous: &[Option<TagValue>],
    current: &[Sample],
    timestamp: Timestamp,
) -> (Vec<ChangeRecord>, TrackerState) {
    let mut changed = Vec::new();
    let mut next = previous.to_vec();

    for (slot, sample) in next.iter_mut().zip(current) {
        if slot.as_ref() != Some(&sample.value) {
            changed.push(ChangeRecord {
                tag: sample.tag.clone(),
                value: sample.value.clone(),
                timestamp,
            });
            *slot = Some(sample.value.clone());
        }
    }

    (changed, next)
}

/// Owner of one tracker state
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    state: TrackerState,
}

impl ChangeTracker {
    /// Tracker for `count` tags with every value unknown
    pub fn unknown(count: usize) -> Self {
        Self {
            state: vec![None; count],
        }
    }

    /// Tracker seeded from a baseline read
    ///
    /// Only values that differ from the baseline are reported afterwards.
    pub fn seeded(baseline: &[Sample]) -> Self {
        Self {
            state: baseline.iter().map(|s| Some(s.value.clone())).collect(),
        }
    }

    /// Run the diff and keep the updated state
    pub fn diff(&mut self, current: &[Sample], timestamp: Timestamp) -> Vec<ChangeRecord> {
        let (changed, next) = diff(&self.state, current, timestamp);
        self.state = next;
        changed
    }

    /// Number of tracked tags
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}
