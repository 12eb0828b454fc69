//! Test Helper Utilities
//!
//! Shared fixtures for tapedeck-fetch integration tests

#![allow(dead_code)]

pub mod audio_fixtures;
pub mod catalog_server;

pub use audio_fixtures::{tagged_mp3_bytes, untagged_bytes, write_tagged_wav};
pub use catalog_server::CatalogServer;

use std::path::Path;
use tapedeck_fetch::db::Ledger;
use tapedeck_fetch::services::{
    Downloader, DownloadOrchestrator, FormatConverter, MetadataRelocator, RunContext,
};
use tapedeck_common::config::ConvertConfig;
use tokio_util::sync::CancellationToken;

/// Orchestrator over `root` with an in-memory ledger
pub async fn orchestrator(root: &Path) -> DownloadOrchestrator {
    orchestrator_with(root, Some(Ledger::in_memory().await.unwrap()), CancellationToken::new())
}

pub fn orchestrator_with(
    root: &Path,
    ledger: Option<Ledger>,
    cancel: CancellationToken,
) -> DownloadOrchestrator {
    DownloadOrchestrator::new(RunContext {
        root: root.to_path_buf(),
        downloader: Downloader::new(reqwest::Client::new()),
        converter: FormatConverter::new(&ConvertConfig::default()),
        relocator: MetadataRelocator::new(root),
        ledger,
        cancel,
    })
}

/// Every file under `root` (relative, sorted), skipping dotfiles
pub fn tree(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}
