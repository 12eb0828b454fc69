//! Streamed resource download
//!
//! The body is written chunk by chunk to `<dest>.part` and renamed onto
//! `<dest>` only after the last chunk is flushed, so an interrupted or failed
//! download never leaves something that looks like a finished file. The final
//! move never replaces a file already at `<dest>`.

use crate::error::FetchError;
use crate::utils::no_clobber::move_no_clobber;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Suffix appended to in-progress downloads
pub const PARTIAL_SUFFIX: &str = "part";

/// Result of one successful download
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub bytes: u64,
    pub elapsed: Duration,
    pub status: u16,
}

/// Sibling path used while the body is being written
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Turn a decoded resource URL back into a request URL
///
/// Catalog URLs carry decoded paths (`Song: One?.m4a`), so the path is split
/// on `/` and every segment re-encoded instead of letting `?` or `#` start a
/// query or fragment.
pub fn request_url(resource_url: &str) -> Result<Url, FetchError> {
    let invalid = || FetchError::InvalidUrl(resource_url.to_string());

    let scheme_end = resource_url.find("://").ok_or_else(invalid)? + 3;
    let (authority, path) = match resource_url[scheme_end..].find('/') {
        Some(slash) => resource_url.split_at(scheme_end + slash),
        None => (resource_url, ""),
    };

    let mut url = Url::parse(authority).map_err(|_| invalid())?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
        segments.pop_if_empty();
        segments.extend(path.trim_start_matches('/').split('/'));
    }
    Ok(url)
}

/// Downloads resources over a shared HTTP client
#[derive(Clone)]
pub struct Downloader {
    http_client: reqwest::Client,
}

impl Downloader {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Stream `resource_url` into `dest`
    ///
    /// On any failure the partial file is removed and `dest` is untouched.
    pub async fn fetch_to(&self, resource_url: &str, dest: &Path) -> Result<FetchReport, FetchError> {
        let url = request_url(resource_url)?;
        let part = partial_path(dest);
        let start = Instant::now();

        match self.stream_body(url, &part).await {
            Ok((bytes, status)) => {
                if let Err(e) = finish_partial(&part, dest).await {
                    remove_partial(&part).await;
                    return Err(e);
                }
                Ok(FetchReport {
                    bytes,
                    elapsed: start.elapsed(),
                    status,
                })
            }
            Err(e) => {
                remove_partial(&part).await;
                Err(e)
            }
        }
    }

    async fn stream_body(&self, url: Url, part: &Path) -> Result<(u64, u16), FetchError> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = tokio::fs::File::create(part).await?;
        let mut bytes = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok((bytes, status.as_u16()))
    }
}

/// Move the finished body onto `dest` without replacing anything there
async fn finish_partial(part: &Path, dest: &Path) -> Result<(), FetchError> {
    let (src, dst) = (part.to_path_buf(), dest.to_path_buf());
    let moved = tokio::task::spawn_blocking(move || move_no_clobber(&src, &dst))
        .await
        .map_err(|e| FetchError::Io(std::io::Error::other(e.to_string())))?;

    match moved {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(FetchError::Occupied(dest.display().to_string()))
        }
        Err(e) => Err(FetchError::Io(e)),
    }
}

async fn remove_partial(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %part.display(), error = %e, "Failed to remove partial download");
        }
    }
}
