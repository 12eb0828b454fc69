//! tapedeck-fetch - catalog downloader
//!
//! Fetches the catalog manifest, downloads every referenced track into
//! `<root>/<album>/`, converts non-native containers, and moves files into
//! the folder named by their album tag.
//!
//! Exit status is non-zero only when configuration or initialization fails.
//! Per-entry failures are logged and counted in the run summary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tapedeck_common::config::{load_config, ConfigSource};
use tapedeck_common::logging::init_tracing;
use tapedeck_fetch::build_info;
use tapedeck_fetch::config::{build_http_client, ConfigOverrides, PipelineSettings};
use tapedeck_fetch::services::catalog_parser::{exclude_albums, CatalogClient};
use tapedeck_fetch::services::download_plan::{plan_downloads, Disposition};
use tapedeck_fetch::services::download_orchestrator::run_catalog;
use tapedeck_fetch::services::metadata_relocator::MetadataRelocator;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for tapedeck-fetch
#[derive(Parser, Debug)]
#[command(name = "tapedeck-fetch")]
#[command(about = "Download, convert and file a remote audio catalog")]
#[command(version, long_version = build_info::LONG_VERSION)]
struct Args {
    /// Bootstrap TOML config file
    #[arg(short, long, env = "TAPEDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Destination root holding one folder per album
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full download pipeline
    Fetch {
        /// Entries processed at once
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Fetch and plan the catalog without downloading anything
    Plan {
        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Move files already under the root into their album folders
    Relocate,
}

#[derive(clap::Args, Debug, Default)]
struct CatalogArgs {
    /// Catalog origin URL
    #[arg(long)]
    origin: Option<String>,

    /// Manifest path relative to the origin
    #[arg(long)]
    manifest_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let (concurrency, catalog_args) = match &args.command {
        Command::Fetch {
            concurrency,
            catalog,
            ..
        } => (*concurrency, Some(catalog)),
        Command::Plan { catalog } => (None, Some(catalog)),
        Command::Relocate => (None, None),
    };
    let overrides = ConfigOverrides {
        root: args.root.clone(),
        log_level: args.log_level.clone(),
        concurrency,
        origin: catalog_args.and_then(|c| c.origin.clone()),
        manifest_path: catalog_args.and_then(|c| c.manifest_path.clone()),
    };
    let settings =
        PipelineSettings::resolve(&loaded.config, &overrides).context("Invalid settings")?;

    std::fs::create_dir_all(&settings.root).with_context(|| {
        format!("Failed to create root folder {}", settings.root.display())
    })?;

    init_tracing(&settings.log_level, Some(&settings.log_file))
        .context("Failed to initialize logging")?;

    info!(
        version = build_info::VERSION,
        git = build_info::GIT_HASH,
        built = build_info::BUILD_TIMESTAMP,
        profile = build_info::BUILD_PROFILE,
        "Starting tapedeck-fetch"
    );
    match &loaded.source {
        ConfigSource::File(path) => info!(path = %path.display(), "Loaded configuration"),
        ConfigSource::Defaults(Some(path)) => {
            warn!(looked_for = %path.display(), "No config file found, using defaults")
        }
        ConfigSource::Defaults(None) => warn!("No config directory available, using defaults"),
    }
    info!(
        root = %settings.root.display(),
        log_file = %settings.log_file.display(),
        ledger = ?settings.ledger_path,
        "Resolved settings"
    );
    settings.log_warnings();

    match args.command {
        Command::Fetch { json, .. } => fetch(&settings, json).await,
        Command::Plan { .. } => plan(&settings).await,
        Command::Relocate => relocate(&settings).await,
    }
}

async fn fetch(settings: &PipelineSettings, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let summary = run_catalog(settings, cancel)
        .await
        .context("Failed to start download run")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    }
    Ok(())
}

async fn plan(settings: &PipelineSettings) -> Result<()> {
    let http_client = build_http_client(&settings.fetch)?;
    let catalog = CatalogClient::new(
        http_client,
        settings.catalog.origin.clone(),
        settings.catalog.manifest_path.clone(),
    );

    let mut entries = catalog.fetch_entries().await;
    let excluded = exclude_albums(&mut entries, &settings.catalog.exclude_albums);
    let plan = plan_downloads(entries, &settings.plan_rules());

    for planned in &plan {
        let dest = planned.destination(&settings.root);
        match planned.disposition {
            Disposition::Duplicate { of } => {
                println!("{:>5}  duplicate of #{}  {}", planned.index, of, planned.entry.resource_url)
            }
            Disposition::Unique if planned.renamed => {
                println!("{:>5}  renamed  {}", planned.index, dest.display())
            }
            Disposition::Unique => println!("{:>5}  {}", planned.index, dest.display()),
        }
    }

    info!(
        planned = plan.len(),
        duplicates = plan.iter().filter(|p| p.is_duplicate()).count(),
        renamed = plan.iter().filter(|p| p.renamed).count(),
        excluded,
        "Plan complete"
    );
    Ok(())
}

async fn relocate(settings: &PipelineSettings) -> Result<()> {
    let relocator = MetadataRelocator::new(&settings.root);
    let report = tokio::task::spawn_blocking(move || relocator.relocate_tree())
        .await
        .context("Relocation sweep panicked")?;
    println!(
        "scanned {}  moved {}  already filed {}  no album {}  conflicts {}  failed {}",
        report.scanned,
        report.moved,
        report.already_filed,
        report.no_album,
        report.conflicts,
        report.failed
    );
    Ok(())
}

/// Stop dispatching new entries on Ctrl+C; in-flight entries finish
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, finishing in-flight downloads");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}
