//! Run-scoped progress tracking
//!
//! One mutex guards the counters. Each finished entry is recorded exactly
//! once; the `[n/total]` log line is emitted while the lock is held so lines
//! never interleave out of order.

use crate::models::{ConversionStatus, EntryOutcome};
use std::sync::{Mutex, PoisonError};

/// Counters at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub finished: usize,
    pub already_done: usize,
    pub duplicates: usize,
    pub completed: usize,
    pub failed: usize,
    pub converted: usize,
    pub conversion_failed: usize,
    pub relocated: usize,
}

pub struct ProgressTracker {
    total: usize,
    state: Mutex<ProgressSnapshot>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::new(ProgressSnapshot::default()),
        }
    }

    /// Count one finished entry and log its position in the run
    pub fn record(&self, index: usize, resource_url: &str, outcome: &EntryOutcome) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        state.finished += 1;
        match outcome {
            EntryOutcome::AlreadyDone { .. } => state.already_done += 1,
            EntryOutcome::Duplicate { .. } => state.duplicates += 1,
            EntryOutcome::Completed {
                conversion,
                relocated,
                ..
            } => {
                state.completed += 1;
                match conversion {
                    ConversionStatus::Converted => state.converted += 1,
                    ConversionStatus::Failed => state.conversion_failed += 1,
                    ConversionStatus::NotNeeded => {}
                }
                if *relocated {
                    state.relocated += 1;
                }
            }
            EntryOutcome::Failed { .. } => state.failed += 1,
        }

        tracing::info!(
            progress = format!("[{}/{}]", state.finished, self.total),
            entry = index,
            url = %resource_url,
            outcome = outcome.label(),
            "Entry finished"
        );

        state.finished
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
