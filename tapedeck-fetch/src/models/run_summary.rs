//! Batch summary

use serde::{Deserialize, Serialize};

/// Counts reported when a run finishes
///
/// `finished` counts entries that reached a terminal outcome and always
/// equals `dispatched`. It only falls short of `submitted` when the run was
/// cancelled before every entry was dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub submitted: usize,
    pub dispatched: usize,
    pub finished: usize,
    pub already_done: usize,
    pub duplicates: usize,
    pub completed: usize,
    pub failed: usize,
    pub converted: usize,
    pub conversion_failed: usize,
    pub relocated: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Every submitted entry reached a terminal state
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.finished == self.submitted
    }

    /// Entries that went over the network this run
    pub fn fetched(&self) -> usize {
        self.completed
    }
}
