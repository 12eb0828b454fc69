//! Catalog entry: one resource paired with the album context in effect

use serde::{Deserialize, Serialize};

/// One `(resource, album-context)` pair from the manifest
///
/// `resource_url` is the catalog origin joined with the percent-decoded
/// resource path. `album_context` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub resource_url: String,
    pub album_context: String,
}

impl CatalogEntry {
    pub fn new(resource_url: impl Into<String>, album_context: impl Into<String>) -> Self {
        Self {
            resource_url: resource_url.into(),
            album_context: album_context.into(),
        }
    }

    /// Last path segment of the resource URL (unsanitized)
    pub fn basename(&self) -> &str {
        self.resource_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.resource_url)
    }
}
