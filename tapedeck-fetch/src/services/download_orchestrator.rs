//! Download Orchestrator
//!
//! Runs every planned catalog entry through its own pipeline with bounded
//! parallelism:
//!
//! ```text
//! Checking → Fetching → Converting? → Relocating → Done
//!     └──────────┴───────────┴─────────────┴──→ Failed(stage)
//! ```
//!
//! # Architecture
//! - `futures::stream::buffer_unordered(concurrency)` over the plan; each
//!   in-flight future owns one entry from start to finish
//! - Dispatch follows plan order, completion order is unspecified
//! - Run-scoped [`RunContext`] carries the HTTP client, converter, relocator,
//!   ledger and cancellation token; nothing is process-global
//! - A failing entry never stops the batch
//! - Every planned destination is reserved for its entry: relocation never
//!   moves another file onto it, and an existing file there only counts as
//!   done when the ledger does not attribute it to a different entry

use crate::config::{build_http_client, PipelineSettings};
use crate::db::{Ledger, LedgerRecord};
use crate::error::{FailureKind, FetchError, PipelineError};
use crate::models::{CatalogEntry, ConversionStatus, EntryOutcome, EntryStage, RunSummary};
use crate::services::catalog_parser::{exclude_albums, CatalogClient};
use crate::services::download_plan::{plan_downloads, Disposition, PlanRules, PlannedEntry};
use crate::services::downloader::Downloader;
use crate::services::format_converter::{ConversionOutcome, FormatConverter};
use crate::services::metadata_relocator::{MetadataRelocator, Relocation};
use crate::services::progress::ProgressTracker;
use chrono::Utc;
use futures::future;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one run shares between its workers
pub struct RunContext {
    pub root: PathBuf,
    pub downloader: Downloader,
    pub converter: FormatConverter,
    pub relocator: MetadataRelocator,
    /// `None` disables the ledger (destination checks only)
    pub ledger: Option<Ledger>,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Build the context from resolved settings, opening the ledger if enabled
    pub async fn from_settings(
        settings: &PipelineSettings,
        http_client: reqwest::Client,
        cancel: CancellationToken,
    ) -> tapedeck_common::Result<Self> {
        let ledger = match &settings.ledger_path {
            Some(path) => Some(Ledger::open(path).await?),
            None => None,
        };

        Ok(Self {
            root: settings.root.clone(),
            downloader: Downloader::new(http_client),
            converter: FormatConverter::new(&settings.convert),
            relocator: MetadataRelocator::new(&settings.root),
            ledger,
            cancel,
        })
    }
}

pub struct DownloadOrchestrator {
    ctx: Arc<RunContext>,
    rules: PlanRules,
}

impl DownloadOrchestrator {
    pub fn new(ctx: RunContext) -> Self {
        let rules = ctx.converter.plan_rules();
        Self {
            ctx: Arc::new(ctx),
            rules,
        }
    }

    /// Plan destinations for `entries` without touching the network
    pub fn plan(&self, entries: Vec<CatalogEntry>) -> Vec<PlannedEntry> {
        plan_downloads(entries, &self.rules)
    }

    /// Plan and process `entries` with at most `concurrency` in flight
    pub async fn run(&self, entries: Vec<CatalogEntry>, concurrency: usize) -> RunSummary {
        let plan = self.plan(entries);
        self.run_plan(plan, concurrency).await
    }

    /// Process an already planned batch
    ///
    /// Returns once every dispatched entry has finished. Cancellation stops
    /// further dispatch; entries already in flight run to completion.
    pub async fn run_plan(&self, plan: Vec<PlannedEntry>, concurrency: usize) -> RunSummary {
        let start = Instant::now();
        let submitted = plan.len();
        let concurrency = concurrency.max(1);

        let progress = Arc::new(ProgressTracker::new(submitted));
        let dispatched = Arc::new(AtomicUsize::new(0));
        let relocator = self
            .ctx
            .relocator
            .clone()
            .with_reserved(self.reserved_paths(&plan));

        info!(
            entries = submitted,
            concurrency,
            root = %self.ctx.root.display(),
            "Starting download batch"
        );

        let cancel = self.ctx.cancel.clone();
        stream::iter(plan)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(|planned| {
                let ctx = self.ctx.clone();
                let relocator = relocator.clone();
                let progress = progress.clone();
                let dispatched = dispatched.clone();

                async move {
                    dispatched.fetch_add(1, Ordering::Relaxed);
                    let outcome = process_entry(&ctx, &relocator, &planned).await;
                    progress.record(planned.index, &planned.entry.resource_url, &outcome);
                }
            })
            .buffer_unordered(concurrency)
            .for_each(|()| future::ready(()))
            .await;

        let dispatched = dispatched.load(Ordering::Relaxed);
        let snapshot = progress.snapshot();
        let summary = RunSummary {
            submitted,
            dispatched,
            finished: snapshot.finished,
            already_done: snapshot.already_done,
            duplicates: snapshot.duplicates,
            completed: snapshot.completed,
            failed: snapshot.failed,
            converted: snapshot.converted,
            conversion_failed: snapshot.conversion_failed,
            relocated: snapshot.relocated,
            cancelled: dispatched < submitted,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        if summary.cancelled {
            warn!(
                dispatched = summary.dispatched,
                submitted = summary.submitted,
                "Batch cancelled before every entry was dispatched"
            );
        }

        info!(
            submitted = summary.submitted,
            finished = summary.finished,
            already_done = summary.already_done,
            duplicates = summary.duplicates,
            completed = summary.completed,
            failed = summary.failed,
            converted = summary.converted,
            conversion_failed = summary.conversion_failed,
            relocated = summary.relocated,
            elapsed_ms = summary.elapsed_ms,
            "Download batch complete"
        );

        summary
    }

    /// Destinations of every unique entry, plus their converted names
    fn reserved_paths(&self, plan: &[PlannedEntry]) -> HashSet<PathBuf> {
        let mut reserved = HashSet::new();
        for planned in plan.iter().filter(|p| !p.is_duplicate()) {
            let dest = planned.destination(&self.ctx.root);
            if self.ctx.converter.is_convertible(&dest) {
                reserved.insert(self.ctx.converter.target_path(&dest));
            }
            reserved.insert(dest);
        }
        reserved
    }
}

/// What the existence check found for one entry
enum Existing {
    /// An earlier run finished this entry; the file is here
    Done(PathBuf),
    /// The destination holds a file the ledger attributes to another entry
    Occupied { path: PathBuf, owner: String },
    Absent,
}

fn failed(stage: EntryStage, error: PipelineError) -> EntryOutcome {
    EntryOutcome::Failed {
        stage,
        kind: error.kind(),
        reason: error.to_string(),
    }
}

/// One entry's full pipeline
async fn process_entry(
    ctx: &RunContext,
    relocator: &MetadataRelocator,
    planned: &PlannedEntry,
) -> EntryOutcome {
    let url = planned.entry.resource_url.as_str();

    if let Disposition::Duplicate { of } = planned.disposition {
        debug!(entry = planned.index, url = %url, of, "Duplicate catalog entry, skipping");
        return EntryOutcome::Duplicate { of };
    }

    let dest = planned.destination(&ctx.root);
    debug!(entry = planned.index, url = %url, dest = %dest.display(), stage = %EntryStage::Checking, "Entry started");

    match find_existing(ctx, planned, &dest).await {
        Existing::Done(existing) => {
            info!(entry = planned.index, path = %existing.display(), "Already downloaded");
            return EntryOutcome::AlreadyDone { path: existing };
        }
        Existing::Occupied { path, owner } => {
            warn!(
                entry = planned.index,
                path = %path.display(),
                owner = %owner,
                kind = %FailureKind::Filesystem,
                "Destination holds another entry's file, not downloading"
            );
            let error = FetchError::Occupied(path.display().to_string());
            return failed(EntryStage::Checking, error.into());
        }
        Existing::Absent => {}
    }

    // Fetching
    if let Some(folder) = dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(folder).await {
            warn!(entry = planned.index, folder = %folder.display(), error = %e, "Failed to create album folder");
            return failed(EntryStage::Fetching, e.into());
        }
    }

    info!(entry = planned.index, url = %url, stage = %EntryStage::Fetching, "Downloading");
    let report = match ctx.downloader.fetch_to(url, &dest).await {
        Ok(report) => report,
        Err(e) => {
            warn!(
                entry = planned.index,
                url = %url,
                stage = %EntryStage::Fetching,
                kind = %e.kind(),
                error = %e,
                "Download failed"
            );
            return failed(EntryStage::Fetching, e.into());
        }
    };
    info!(
        entry = planned.index,
        path = %dest.display(),
        bytes = report.bytes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Saved"
    );

    // Converting
    let (path, conversion) = if ctx.converter.is_convertible(&dest) {
        debug!(entry = planned.index, stage = %EntryStage::Converting, "Converting");
        match ctx.converter.convert(&dest).await {
            ConversionOutcome::Converted { to, .. } => (to, ConversionStatus::Converted),
            ConversionOutcome::Failed { path, .. } => (path, ConversionStatus::Failed),
        }
    } else {
        (dest.clone(), ConversionStatus::NotNeeded)
    };

    // Relocating
    debug!(entry = planned.index, stage = %EntryStage::Relocating, path = %path.display(), "Checking album tag");
    let relocation = relocator.relocate(&path).await;
    match &relocation {
        Relocation::Moved { .. } | Relocation::AlreadyFiled { .. } | Relocation::NoAlbum { .. } => {}
        Relocation::Conflict { occupied, .. } => {
            debug!(entry = planned.index, occupied = %occupied.display(), "Kept in download folder");
        }
        Relocation::Failed { reason, .. } => {
            warn!(
                entry = planned.index,
                kind = %FailureKind::Filesystem,
                reason = %reason,
                "Relocation failed, file kept in download folder"
            );
        }
    }
    let final_path = relocation.path().to_path_buf();

    if let Some(ledger) = &ctx.ledger {
        let record = LedgerRecord {
            resource_url: planned.entry.resource_url.clone(),
            album_context: planned.entry.album_context.clone(),
            download_path: dest.clone(),
            final_path: final_path.clone(),
            bytes: report.bytes,
            completed_at: Utc::now(),
        };
        if let Err(e) = ledger.record(&record).await {
            warn!(entry = planned.index, error = %e, "Failed to record download in ledger");
        }
    }

    debug!(entry = planned.index, stage = %EntryStage::Done, path = %final_path.display(), "Entry done");

    EntryOutcome::Completed {
        path: final_path,
        bytes: report.bytes,
        conversion,
        relocated: relocation.is_moved(),
    }
}

/// Look for an earlier result for this entry
///
/// Checks the planned destination, its converted sibling, then the ledger.
/// A file found at the destination is only taken as this entry's when the
/// ledger does not record it as another entry's final path.
async fn find_existing(ctx: &RunContext, planned: &PlannedEntry, dest: &Path) -> Existing {
    let mut candidates = vec![dest.to_path_buf()];
    if ctx.converter.is_convertible(dest) {
        candidates.push(ctx.converter.target_path(dest));
    }

    for candidate in candidates {
        if !candidate.exists() {
            continue;
        }
        return match claimed_by_other(ctx, planned, &candidate).await {
            Some(owner) => Existing::Occupied {
                path: candidate,
                owner,
            },
            None => Existing::Done(candidate),
        };
    }

    let Some(ledger) = &ctx.ledger else {
        return Existing::Absent;
    };
    match ledger
        .existing_final_path(&planned.entry.resource_url, &planned.entry.album_context)
        .await
    {
        Ok(Some(path)) => Existing::Done(path),
        Ok(None) => Existing::Absent,
        Err(e) => {
            warn!(entry = planned.index, error = %e, "Ledger lookup failed, checking destination only");
            Existing::Absent
        }
    }
}

/// Resource URL of a different entry whose recorded final path is `path`
async fn claimed_by_other(ctx: &RunContext, planned: &PlannedEntry, path: &Path) -> Option<String> {
    let ledger = ctx.ledger.as_ref()?;
    match ledger
        .other_owner(path, &planned.entry.resource_url, &planned.entry.album_context)
        .await
    {
        Ok(owner) => owner,
        Err(e) => {
            warn!(entry = planned.index, error = %e, "Ledger ownership lookup failed");
            None
        }
    }
}

/// Fetch the manifest, filter it, and run the whole batch
///
/// A manifest that cannot be retrieved (or parses to nothing) is a clean,
/// empty run.
pub async fn run_catalog(
    settings: &PipelineSettings,
    cancel: CancellationToken,
) -> tapedeck_common::Result<RunSummary> {
    let http_client = build_http_client(&settings.fetch)?;
    let catalog = CatalogClient::new(
        http_client.clone(),
        settings.catalog.origin.clone(),
        settings.catalog.manifest_path.clone(),
    );

    let mut entries = catalog.fetch_entries().await;
    let excluded = exclude_albums(&mut entries, &settings.catalog.exclude_albums);
    if excluded > 0 {
        info!(excluded, "Dropped entries from excluded albums");
    }

    if entries.is_empty() {
        info!("Nothing to do");
        return Ok(RunSummary::default());
    }

    std::fs::create_dir_all(&settings.root)?;
    let ctx = RunContext::from_settings(settings, http_client, cancel).await?;
    let orchestrator = DownloadOrchestrator::new(ctx);
    Ok(orchestrator.run(entries, settings.fetch.concurrency).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapedeck_common::config::ConvertConfig;

    async fn context(root: &Path, cancel: CancellationToken) -> RunContext {
        RunContext {
            root: root.to_path_buf(),
            downloader: Downloader::new(reqwest::Client::new()),
            converter: FormatConverter::new(&ConvertConfig::default()),
            relocator: MetadataRelocator::new(root),
            ledger: Some(Ledger::in_memory().await.unwrap()),
            cancel,
        }
    }

    #[tokio::test]
    async fn test_existing_destination_is_not_fetched() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("A")).unwrap();
        std::fs::write(root.path().join("A").join("r1.mp3"), b"x").unwrap();

        // Unroutable origin: any fetch attempt would fail the entry
        let orchestrator = DownloadOrchestrator::new(context(root.path(), CancellationToken::new()).await);
        let summary = orchestrator
            .run(vec![CatalogEntry::new("http://127.0.0.1:9/r1.mp3", "A")], 2)
            .await;

        assert_eq!(summary.already_done, 1);
        assert_eq!(summary.failed, 0);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn test_converted_sibling_counts_as_done() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("Holiday__")).unwrap();
        std::fs::write(root.path().join("Holiday__").join("Song_ One_.mp3"), b"x").unwrap();

        let orchestrator = DownloadOrchestrator::new(context(root.path(), CancellationToken::new()).await);
        let summary = orchestrator
            .run(
                vec![CatalogEntry::new("http://127.0.0.1:9/music/Song: One?.m4a", "Holiday!!")],
                1,
            )
            .await;

        assert_eq!(summary.already_done, 1);
    }

    #[tokio::test]
    async fn test_destination_recorded_for_other_entry_is_not_done() {
        let root = tempfile::tempdir().unwrap();
        let occupied = root.path().join("A").join("a.mp3");
        std::fs::create_dir_all(occupied.parent().unwrap()).unwrap();
        std::fs::write(&occupied, b"relocated x").unwrap();

        let ctx = context(root.path(), CancellationToken::new()).await;
        ctx.ledger
            .as_ref()
            .unwrap()
            .record(&LedgerRecord {
                resource_url: "http://127.0.0.1:9/x/a.mp3".to_string(),
                album_context: "Miscellaneous".to_string(),
                download_path: root.path().join("Miscellaneous").join("a.mp3"),
                final_path: occupied.clone(),
                bytes: 11,
                completed_at: Utc::now(),
            })
            .await
            .unwrap();

        let summary = DownloadOrchestrator::new(ctx)
            .run(vec![CatalogEntry::new("http://127.0.0.1:9/y/a.mp3", "A")], 1)
            .await;

        assert_eq!(summary.already_done, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(std::fs::read(&occupied).unwrap(), b"relocated x");
    }

    #[tokio::test]
    async fn test_reserved_paths_cover_converted_names() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = DownloadOrchestrator::new(context(root.path(), CancellationToken::new()).await);
        let plan = orchestrator.plan(vec![
            CatalogEntry::new("http://host/a.m4a", "A"),
            CatalogEntry::new("http://host/a.m4a", "A"),
            CatalogEntry::new("http://host/b.mp3", "B"),
        ]);

        let reserved = orchestrator.reserved_paths(&plan);

        assert_eq!(
            reserved,
            HashSet::from([
                root.path().join("A").join("a.m4a"),
                root.path().join("A").join("a.mp3"),
                root.path().join("B").join("b.mp3"),
            ])
        );
    }

    #[tokio::test]
    async fn test_precancelled_run_dispatches_nothing() {
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let orchestrator = DownloadOrchestrator::new(context(root.path(), cancel).await);
        let summary = orchestrator
            .run(
                vec![
                    CatalogEntry::new("http://127.0.0.1:9/a.mp3", "A"),
                    CatalogEntry::new("http://127.0.0.1:9/b.mp3", "A"),
                ],
                2,
            )
            .await;

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.dispatched, 0);
        assert!(summary.cancelled);
        assert!(!summary.is_complete());
    }

    #[tokio::test]
    async fn test_duplicates_counted_not_fetched() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("A")).unwrap();
        std::fs::write(root.path().join("A").join("a.mp3"), b"x").unwrap();

        let orchestrator = DownloadOrchestrator::new(context(root.path(), CancellationToken::new()).await);
        let summary = orchestrator
            .run(
                vec![
                    CatalogEntry::new("http://127.0.0.1:9/a.mp3", "A"),
                    CatalogEntry::new("http://127.0.0.1:9/a.mp3", "A"),
                ],
                2,
            )
            .await;

        assert_eq!(summary.already_done, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.finished, 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = DownloadOrchestrator::new(context(root.path(), CancellationToken::new()).await);
        let summary = orchestrator.run(Vec::new(), 5).await;
        assert_eq!(summary.submitted, 0);
        assert!(summary.is_complete());
    }
}
