//! Per-entry pipeline state machine
//!
//! Each catalog entry moves through
//! `Checking → Fetching → Converting? → Relocating → Done`, or stops in
//! `Failed` at the stage that went wrong. The stage is carried in log fields
//! and in the terminal [`EntryOutcome`].

use crate::error::FailureKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pipeline stage of a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStage {
    /// Existence / ledger check
    Checking,
    /// Streaming the resource body to disk
    Fetching,
    /// Non-native container being transcoded
    Converting,
    /// Moving into the folder named by the album tag
    Relocating,
    /// Terminal
    Done,
}

impl std::fmt::Display for EntryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryStage::Checking => "checking",
            EntryStage::Fetching => "fetching",
            EntryStage::Converting => "converting",
            EntryStage::Relocating => "relocating",
            EntryStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened in the conversion stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// File was already in the native format
    NotNeeded,
    Converted,
    /// Original container kept
    Failed,
}

/// Terminal result of one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Destination (or its converted/relocated successor) already present
    AlreadyDone { path: PathBuf },

    /// Same resource and album context as an earlier entry
    Duplicate { of: usize },

    /// Fetched and processed
    Completed {
        path: PathBuf,
        bytes: u64,
        conversion: ConversionStatus,
        relocated: bool,
    },

    /// Stopped at `stage`
    Failed {
        stage: EntryStage,
        kind: FailureKind,
        reason: String,
    },
}

impl EntryOutcome {
    /// True when the entry ended without doing its work
    pub fn is_failure(&self) -> bool {
        matches!(self, EntryOutcome::Failed { .. })
    }

    /// Short label for progress lines
    pub fn label(&self) -> &'static str {
        match self {
            EntryOutcome::AlreadyDone { .. } => "already done",
            EntryOutcome::Duplicate { .. } => "duplicate",
            EntryOutcome::Completed { .. } => "completed",
            EntryOutcome::Failed { .. } => "failed",
        }
    }
}
