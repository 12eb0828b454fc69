//! tapedeck-fetch library interface
//!
//! Retrieves the audio files referenced by a remote catalog manifest, files
//! them into one folder per album under filesystem-safe names, converts
//! non-native containers, and repairs placement from embedded album tags.
//!
//! Exposes the pipeline components for the CLI and for integration testing.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::{ConfigOverrides, PipelineSettings};
pub use crate::error::{FailureKind, PipelineError};
pub use crate::models::{CatalogEntry, EntryOutcome, EntryStage, RunSummary};

/// Build identification captured by build.rs
pub mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const GIT_HASH: &str = env!("GIT_HASH");
    pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
    pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");

    /// Multi-line description shown by `--version`
    pub const LONG_VERSION: &str = concat!(
        env!("CARGO_PKG_VERSION"),
        "\ngit: ",
        env!("GIT_HASH"),
        "\nbuilt: ",
        env!("BUILD_TIMESTAMP"),
        "\nprofile: ",
        env!("BUILD_PROFILE")
    );
}
