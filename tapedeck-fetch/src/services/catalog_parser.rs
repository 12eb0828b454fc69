//! Catalog manifest parsing and retrieval
//!
//! The manifest is a JavaScript data file. Only two kinds of lines matter:
//!
//! ```text
//! album: "Holiday!!",
//! mp3: "music/Song%3A%20One%3F.m4a",
//! ```
//!
//! Every other line is noise. Lines are classified one at a time
//! ([`classify_line`]) and folded in order ([`CatalogFold`]), carrying the
//! most recent album declaration forward onto each resource that follows it.

use crate::error::CatalogError;
use crate::models::CatalogEntry;
use crate::services::file_namer::MISCELLANEOUS;
use std::collections::HashSet;

const ALBUM_PREFIX: &str = "album:";
const RESOURCE_PREFIX: &str = "mp3:";

/// Classification of one manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLine {
    /// New album context (never empty)
    AlbumDecl(String),
    /// Resource path as written in the manifest (still percent-encoded)
    ResourceDecl(String),
    Other,
}

/// Classify a single manifest line
pub fn classify_line(line: &str) -> CatalogLine {
    let trimmed = line.trim();

    if trimmed.starts_with(ALBUM_PREFIX) {
        let album = collapse_whitespace(declared_value(trimmed));
        if album.is_empty() {
            return CatalogLine::AlbumDecl(MISCELLANEOUS.to_string());
        }
        return CatalogLine::AlbumDecl(album);
    }

    if trimmed.starts_with(RESOURCE_PREFIX) {
        let value = declared_value(trimmed);
        if value.is_empty() {
            return CatalogLine::Other;
        }
        return CatalogLine::ResourceDecl(value.to_string());
    }

    CatalogLine::Other
}

/// Text after the first `:`, trimmed, with quote/comma runs stripped
fn declared_value(line: &str) -> &str {
    line.split_once(':')
        .map(|(_, value)| value.trim().trim_matches(|c: char| c == '"' || c == ',').trim())
        .unwrap_or("")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join a manifest resource path onto the catalog origin
///
/// The path is percent-decoded; invalid UTF-8 escapes leave it as written.
pub fn resolve_resource(origin: &str, value: &str) -> String {
    let path = value.trim_start_matches('/');
    let decoded = urlencoding::decode(path)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| path.to_string());
    format!("{}/{}", origin.trim_end_matches('/'), decoded)
}

/// Stateful fold over classified lines
#[derive(Debug, Clone)]
pub struct CatalogFold {
    origin: String,
    current_album: String,
}

impl CatalogFold {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            current_album: MISCELLANEOUS.to_string(),
        }
    }

    /// Feed one line; returns an entry for resource declarations
    pub fn feed(&mut self, line: &str) -> Option<CatalogEntry> {
        match classify_line(line) {
            CatalogLine::AlbumDecl(album) => {
                self.current_album = album;
                None
            }
            CatalogLine::ResourceDecl(value) => Some(CatalogEntry::new(
                resolve_resource(&self.origin, &value),
                self.current_album.clone(),
            )),
            CatalogLine::Other => None,
        }
    }
}

/// Parse manifest text into ordered catalog entries
pub fn parse_catalog(text: &str, origin: &str) -> Vec<CatalogEntry> {
    let mut fold = CatalogFold::new(origin);
    text.lines().filter_map(|line| fold.feed(line)).collect()
}

/// Drop entries whose album context is in `excluded` (exact match)
///
/// Returns the number of entries removed.
pub fn exclude_albums(entries: &mut Vec<CatalogEntry>, excluded: &[String]) -> usize {
    if excluded.is_empty() {
        return 0;
    }
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    let before = entries.len();
    entries.retain(|entry| !excluded.contains(entry.album_context.as_str()));
    before - entries.len()
}

/// HTTP client for the catalog manifest
pub struct CatalogClient {
    http_client: reqwest::Client,
    origin: String,
    manifest_path: String,
}

impl CatalogClient {
    pub fn new(
        http_client: reqwest::Client,
        origin: impl Into<String>,
        manifest_path: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            origin: origin.into(),
            manifest_path: manifest_path.into(),
        }
    }

    /// Full manifest URL (`origin` + `manifest_path`)
    pub fn manifest_url(&self) -> String {
        format!(
            "{}/{}",
            self.origin.trim_end_matches('/'),
            self.manifest_path.trim_start_matches('/')
        )
    }

    /// Download the manifest text
    pub async fn fetch_manifest(&self) -> Result<String, CatalogError> {
        let url = self.manifest_url();
        tracing::debug!(url = %url, "Requesting catalog manifest");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| CatalogError::Body(e.to_string()))
    }

    /// Download and parse the manifest
    ///
    /// A manifest that cannot be retrieved yields an empty list; the caller
    /// treats that as "nothing to do".
    pub async fn fetch_entries(&self) -> Vec<CatalogEntry> {
        match self.fetch_manifest().await {
            Ok(text) => {
                let entries = parse_catalog(&text, &self.origin);
                tracing::info!(
                    url = %self.manifest_url(),
                    entries = entries.len(),
                    "Catalog manifest parsed"
                );
                entries
            }
            Err(e) => {
                tracing::warn!(
                    url = %self.manifest_url(),
                    kind = %crate::error::FailureKind::ManifestFetch,
                    error = %e,
                    "Catalog manifest unavailable"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://host/";

    #[test]
    fn test_classify_album() {
        assert_eq!(
            classify_line(r#"    album: "Main  Street   Electrical Parade","#),
            CatalogLine::AlbumDecl("Main Street Electrical Parade".to_string())
        );
    }

    #[test]
    fn test_classify_empty_album_is_sentinel() {
        assert_eq!(
            classify_line(r#"album: "","#),
            CatalogLine::AlbumDecl(MISCELLANEOUS.to_string())
        );
        assert_eq!(
            classify_line("album:"),
            CatalogLine::AlbumDecl(MISCELLANEOUS.to_string())
        );
    }

    #[test]
    fn test_classify_resource_keeps_encoding() {
        assert_eq!(
            classify_line(r#"  mp3: "music/Song%3A%20One%3F.m4a","#),
            CatalogLine::ResourceDecl("music/Song%3A%20One%3F.m4a".to_string())
        );
    }

    #[test]
    fn test_classify_noise() {
        assert_eq!(classify_line("var albums = ["), CatalogLine::Other);
        assert_eq!(classify_line("  title: \"x\","), CatalogLine::Other);
        assert_eq!(classify_line(r#"mp3: "","#), CatalogLine::Other);
        assert_eq!(classify_line("   "), CatalogLine::Other);
        // Prefix must start the trimmed line
        assert_eq!(classify_line(r#"{ album: "A" }"#), CatalogLine::Other);
    }

    #[test]
    fn test_value_after_first_colon_only() {
        assert_eq!(
            classify_line(r#"album: "Fantasmic: Live","#),
            CatalogLine::AlbumDecl("Fantasmic: Live".to_string())
        );
    }

    #[test]
    fn test_resolve_resource_decodes() {
        assert_eq!(
            resolve_resource(ORIGIN, "music/Song%3A%20One%3F.m4a"),
            "http://host/music/Song: One?.m4a"
        );
        assert_eq!(resolve_resource("http://host", "/a.mp3"), "http://host/a.mp3");
    }

    #[test]
    fn test_parse_carries_album_forward() {
        let text = r#"
var albumData = [
  {
    album: "A",
    tracks: [
      {
        title: "One",
        mp3: "r1.mp3",
      },
      {
        mp3: "r2.mp3",
      },
    ]
  },
  {
    album: "B",
    tracks: [
      {
        title: "no resource here",
      },
    ]
  },
];
mp3: "r3.mp3",
"#;
        let entries = parse_catalog(text, ORIGIN);
        assert_eq!(
            entries,
            vec![
                CatalogEntry::new("http://host/r1.mp3", "A"),
                CatalogEntry::new("http://host/r2.mp3", "A"),
                CatalogEntry::new("http://host/r3.mp3", "B"),
            ]
        );
    }

    #[test]
    fn test_parse_scenario() {
        let text = "album: \"A\",\nmp3: \"r1\",\nmp3: \"r2\",\nalbum: \"B\",\nmp3: \"r3\",\n";
        let entries = parse_catalog(text, ORIGIN);
        assert_eq!(
            entries,
            vec![
                CatalogEntry::new("http://host/r1", "A"),
                CatalogEntry::new("http://host/r2", "A"),
                CatalogEntry::new("http://host/r3", "B"),
            ]
        );
    }

    #[test]
    fn test_parse_before_any_album_uses_sentinel() {
        let entries = parse_catalog("mp3: \"loose.mp3\"\nalbum: \"A\"\n", ORIGIN);
        assert_eq!(entries, vec![CatalogEntry::new("http://host/loose.mp3", MISCELLANEOUS)]);
    }

    #[test]
    fn test_parse_counts_resource_lines() {
        let text = "junk\nmp3: a\nmp3: \"\"\nalbum: X\nmp3: b\n}\n";
        let entries = parse_catalog(text, ORIGIN);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].album_context, MISCELLANEOUS);
        assert_eq!(entries[1].album_context, "X");
    }

    #[test]
    fn test_exclude_albums() {
        let mut entries = vec![
            CatalogEntry::new("http://host/1", "Holiday"),
            CatalogEntry::new("http://host/2", "Parade"),
            CatalogEntry::new("http://host/3", "holiday"),
        ];
        let removed = exclude_albums(&mut entries, &["Holiday".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.album_context != "Holiday"));
    }

    #[test]
    fn test_manifest_url_join() {
        let client = CatalogClient::new(reqwest::Client::new(), "http://host/", "/sodlr/albumData.js");
        assert_eq!(client.manifest_url(), "http://host/sodlr/albumData.js");
    }
}
