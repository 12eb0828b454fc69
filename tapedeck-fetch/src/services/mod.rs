//! Pipeline services for tapedeck-fetch

pub mod catalog_parser;
pub mod download_orchestrator;
pub mod download_plan;
pub mod downloader;
pub mod file_namer;
pub mod format_converter;
pub mod metadata_relocator;
pub mod progress;
pub mod tag_transfer;

pub use catalog_parser::{classify_line, parse_catalog, CatalogClient, CatalogFold, CatalogLine};
pub use download_orchestrator::{run_catalog, DownloadOrchestrator, RunContext};
pub use download_plan::{plan_downloads, Disposition, PlanRules, PlannedEntry};
pub use downloader::{Downloader, FetchReport};
pub use file_namer::{sanitize, MISCELLANEOUS};
pub use format_converter::{ConversionOutcome, FormatConverter};
pub use metadata_relocator::{MetadataRelocator, Relocation, RelocationReport};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use tag_transfer::AudioTags;
