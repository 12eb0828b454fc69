//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration comes from a single TOML file. Every field has a compiled
//! default, so a missing file is not fatal: the caller gets the defaults and a
//! [`ConfigSource::Defaults`] marker it can report once logging is up.
//!
//! # Config file priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`TAPEDECK_CONFIG`)
//! 3. `<config_dir>/tapedeck/config.toml` (per-platform, via `dirs`)
//!
//! # Root folder priority
//!
//! 1. Command-line argument
//! 2. Environment variable (`TAPEDECK_ROOT_FOLDER`)
//! 3. `root_folder` in the TOML file
//! 4. Compiled default (`Disneyland_Audio` under the working directory)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TAPEDECK_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "TAPEDECK_ROOT_FOLDER";

/// Compiled default root folder (relative to the working directory)
pub const DEFAULT_ROOT_FOLDER: &str = "Disneyland_Audio";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Destination root holding one folder per album
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub convert: ConvertConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append-only log file. Relative paths resolve against the root folder.
    /// Defaults to `<root>/.tapedeck.log` when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Remote catalog location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Origin every resource path is prefixed with (trailing slash optional)
    pub origin: String,

    /// Manifest path relative to `origin`
    pub manifest_path: String,

    /// Album contexts whose entries are dropped before dispatch
    pub exclude_albums: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            origin: "http://soundsofdisneyland.com/".to_string(),
            manifest_path: "sodlr/albumData.js".to_string(),
            exclude_albums: Vec::new(),
        }
    }
}

/// Download worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Number of entries processed concurrently
    pub concurrency: usize,

    /// TCP connect timeout
    pub connect_timeout_secs: u64,

    /// Whole-request timeout per resource (0 disables)
    pub request_timeout_secs: u64,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            connect_timeout_secs: 15,
            request_timeout_secs: 600,
            user_agent: format!("tapedeck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Container conversion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Encoder program fed raw PCM on stdin (ffmpeg-compatible arguments)
    pub encoder: String,

    /// Constant bitrate for the native format
    pub bitrate_kbps: u32,

    /// Extensions (lowercase, no dot) that trigger conversion
    pub extensions: Vec<String>,

    /// Native container extension (lowercase, no dot)
    pub native_extension: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            encoder: "ffmpeg".to_string(),
            bitrate_kbps: 320,
            extensions: vec!["m4a".to_string()],
            native_extension: "mp3".to_string(),
        }
    }
}

/// Download ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub enabled: bool,

    /// SQLite file. Relative paths resolve against the root folder.
    /// Defaults to `<root>/.tapedeck-ledger.db` when unset.
    pub path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(Error::Config("fetch.concurrency must be at least 1".to_string()));
        }
        if self.catalog.origin.trim().is_empty() {
            return Err(Error::Config("catalog.origin must not be empty".to_string()));
        }
        if self.convert.bitrate_kbps == 0 {
            return Err(Error::Config("convert.bitrate_kbps must be positive".to_string()));
        }
        if self.convert.native_extension.trim().is_empty() {
            return Err(Error::Config("convert.native_extension must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// No file found; compiled defaults in use. Carries the path that was
    /// looked for, if any.
    Defaults(Option<PathBuf>),
}

/// Configuration plus its provenance
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

/// Per-user default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tapedeck").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))
}

/// Load configuration following the config file priority order
///
/// An explicitly requested file (CLI or environment) must exist. The per-user
/// default location is optional.
pub fn load_config(cli_path: Option<&Path>) -> Result<LoadedConfig> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

    let loaded = match explicit {
        Some(path) => LoadedConfig {
            config: load_toml_config(&path)?,
            source: ConfigSource::File(path),
        },
        None => match default_config_path() {
            Some(path) if path.exists() => LoadedConfig {
                config: load_toml_config(&path)?,
                source: ConfigSource::File(path),
            },
            other => LoadedConfig {
                config: TomlConfig::default(),
                source: ConfigSource::Defaults(other),
            },
        },
    };

    loaded.config.validate()?;
    Ok(loaded)
}

/// Resolve the destination root folder
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = std::env::var_os(ROOT_FOLDER_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    PathBuf::from(DEFAULT_ROOT_FOLDER)
}

/// Resolve an optional configured path against the root folder
///
/// Absolute paths are kept, relative ones are joined onto `root`, and `None`
/// falls back to `root/default_name`.
pub fn resolve_under_root(root: &Path, configured: Option<&Path>, default_name: &str) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => root.join(path),
        None => root.join(default_name),
    }
}
