//! Error types for tapedeck-fetch
//!
//! Every failure in the pipeline belongs to one [`FailureKind`]. Only a
//! manifest failure ends a run early; everything else is confined to the entry
//! it happened in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy used in logs and run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Manifest could not be retrieved; the run has nothing to do
    ManifestFetch,
    /// One resource could not be fetched; that entry is skipped
    ResourceFetch,
    /// Container conversion failed; the original file is kept
    Conversion,
    /// Tags could not be read; treated as "no album known"
    TagRead,
    /// Filesystem operation failed for one entry
    Filesystem,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::ManifestFetch => "manifest_fetch",
            FailureKind::ResourceFetch => "resource_fetch",
            FailureKind::Conversion => "conversion",
            FailureKind::TagRead => "tag_read",
            FailureKind::Filesystem => "filesystem",
        };
        f.write_str(name)
    }
}

/// Manifest retrieval errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Connection, DNS, or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("Manifest request failed with HTTP {0}")]
    Status(u16),

    /// Body could not be read as text
    #[error("Failed to read manifest body: {0}")]
    Body(String),
}

/// Resource download errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Resource URL could not be turned into a request URL
    #[error("Invalid resource URL: {0}")]
    InvalidUrl(String),

    /// Connection, DNS, timeout, or mid-body transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Destination holds a file that belongs to another entry
    #[error("Destination already occupied: {0}")]
    Occupied(String),

    /// Writing the destination file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Io(_) | FetchError::Occupied(_) => FailureKind::Filesystem,
            _ => FailureKind::ResourceFetch,
        }
    }
}

/// Container conversion errors
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Source already has the native extension
    #[error("Source is already in the native format: {0}")]
    AlreadyNative(String),

    /// Source could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Encoder process could not be started
    #[error("Failed to start encoder '{program}': {reason}")]
    EncoderSpawn { program: String, reason: String },

    /// Encoder process exited unsuccessfully
    #[error("Encoder exited with {status}: {stderr}")]
    EncoderFailed { status: String, stderr: String },

    /// Source tags could not be read
    #[error("Failed to read source tags: {0}")]
    TagRead(String),

    /// Destination tags could not be written
    #[error("Failed to write tags: {0}")]
    TagWrite(String),

    /// Blocking conversion task did not complete
    #[error("Conversion task failed: {0}")]
    Task(String),

    /// Rename or delete failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure inside one entry's pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Ledger lookup or write failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] tapedeck_common::Error),

    /// Folder creation or other filesystem work failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Catalog(_) => FailureKind::ManifestFetch,
            PipelineError::Fetch(e) => e.kind(),
            PipelineError::Conversion(_) => FailureKind::Conversion,
            PipelineError::Ledger(_) | PipelineError::Io(_) => FailureKind::Filesystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            PipelineError::from(FetchError::Status(404)).kind(),
            FailureKind::ResourceFetch
        );
        assert_eq!(
            PipelineError::from(FetchError::Io(std::io::Error::other("disk full"))).kind(),
            FailureKind::Filesystem
        );
        assert_eq!(
            PipelineError::from(FetchError::Occupied("A/a.mp3".to_string())).kind(),
            FailureKind::Filesystem
        );
        assert_eq!(
            PipelineError::from(CatalogError::Status(500)).kind(),
            FailureKind::ManifestFetch
        );
        assert_eq!(
            PipelineError::from(ConversionError::Decode("bad".to_string())).kind(),
            FailureKind::Conversion
        );
    }

    #[test]
    fn test_failure_kind_display_matches_serde() {
        let json = serde_json::to_string(&FailureKind::ResourceFetch).unwrap();
        assert_eq!(json, format!("\"{}\"", FailureKind::ResourceFetch));
    }
}
