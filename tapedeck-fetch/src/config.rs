//! Pipeline settings for tapedeck-fetch
//!
//! Merges the bootstrap TOML configuration with command-line overrides into
//! one resolved [`PipelineSettings`]. Priority for every field is
//! CLI → environment (where one exists) → TOML → compiled default.

use crate::services::download_plan::PlanRules;
use std::path::PathBuf;
use std::time::Duration;
use tapedeck_common::config::{
    resolve_root_folder, resolve_under_root, CatalogConfig, ConvertConfig, FetchConfig, TomlConfig,
};
use tapedeck_common::{Error, Result};
use tracing::warn;

/// Default log file name under the root folder
pub const DEFAULT_LOG_FILE: &str = ".tapedeck.log";

/// Default ledger database name under the root folder
pub const DEFAULT_LEDGER_FILE: &str = ".tapedeck-ledger.db";

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub log_level: Option<String>,
    pub concurrency: Option<usize>,
    pub origin: Option<String>,
    pub manifest_path: Option<String>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub root: PathBuf,
    pub log_level: String,
    pub log_file: PathBuf,
    /// `None` when the ledger is disabled
    pub ledger_path: Option<PathBuf>,
    pub catalog: CatalogConfig,
    pub fetch: FetchConfig,
    pub convert: ConvertConfig,
}

impl PipelineSettings {
    pub fn resolve(config: &TomlConfig, overrides: &ConfigOverrides) -> Result<Self> {
        let root = resolve_root_folder(overrides.root.as_deref(), config);

        let mut catalog = config.catalog.clone();
        if let Some(origin) = &overrides.origin {
            catalog.origin = origin.clone();
        }
        if let Some(manifest_path) = &overrides.manifest_path {
            catalog.manifest_path = manifest_path.clone();
        }
        if catalog.origin.trim().is_empty() {
            return Err(Error::InvalidInput("origin must not be empty".to_string()));
        }

        let mut fetch = config.fetch.clone();
        if let Some(concurrency) = overrides.concurrency {
            if concurrency == 0 {
                return Err(Error::InvalidInput("concurrency must be at least 1".to_string()));
            }
            fetch.concurrency = concurrency;
        }

        let log_level = overrides
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone());
        let log_file = resolve_under_root(&root, config.logging.file.as_deref(), DEFAULT_LOG_FILE);
        let ledger_path = config
            .ledger
            .enabled
            .then(|| resolve_under_root(&root, config.ledger.path.as_deref(), DEFAULT_LEDGER_FILE));

        Ok(Self {
            root,
            log_level,
            log_file,
            ledger_path,
            catalog,
            fetch,
            convert: config.convert.clone(),
        })
    }

    /// Naming rules for the destination planner
    pub fn plan_rules(&self) -> PlanRules {
        PlanRules {
            convertible: self.convert.extensions.iter().map(|e| e.to_lowercase()).collect(),
            native_extension: self.convert.native_extension.to_lowercase(),
        }
    }

    /// Warn about settings that work but are probably not intended
    pub fn log_warnings(&self) {
        if self.fetch.concurrency > 32 {
            warn!(
                concurrency = self.fetch.concurrency,
                "High concurrency may overload the catalog server"
            );
        }
        if self.convert.extensions.is_empty() {
            warn!("No convertible extensions configured; files keep their original container");
        }
    }
}

/// HTTP client shared by the manifest fetch and every download
pub fn build_http_client(fetch: &FetchConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(fetch.user_agent.clone())
        .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs));
    if fetch.request_timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(fetch.request_timeout_secs));
    }
    builder
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))
}
