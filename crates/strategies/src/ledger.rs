use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Remembers which transition ids a policy has already learned from.
///
/// Ids at or below `floor` are all applied; `above` holds the sparse ids past it and is
/// folded into the floor as soon as it becomes contiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionLedger {
    floor: u64,
    above: BTreeSet<u64>,
}

impl TransitionLedger {
    pub fn contains(&self, id: u64) -> bool {
        id <= self.floor || self.above.contains(&id)
    }

    /// Records `id`; returns `false` if it was already applied.
    pub fn insert(&mut self, id: u64) -> bool {
        if self.contains(id) {
            return false;
        }
        self.above.insert(id);
        while self.above.remove(&(self.floor + 1)) {
            self.floor += 1;
        }
        true
    }

    /// Highest applied id, `0` when empty.
    pub fn watermark(&self) -> u64 {
        self.above.last().copied().unwrap_or(self.floor).max(self.floor)
    }

    pub fn pending_gaps(&self) -> usize {
        self.above.len()
    }
}
