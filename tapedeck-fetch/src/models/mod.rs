//! Data models for tapedeck-fetch
//!
//! - Catalog entries produced by the manifest parser
//! - Per-entry pipeline stages and terminal outcomes
//! - Run summary reported at the end of a batch

pub mod catalog_entry;
pub mod entry_outcome;
pub mod run_summary;

pub use catalog_entry::CatalogEntry;
pub use entry_outcome::{ConversionStatus, EntryOutcome, EntryStage};
pub use run_summary::RunSummary;
