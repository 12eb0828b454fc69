//! Album-tag driven relocation
//!
//! A file is correctly filed when the name of its parent folder equals
//! `sanitize(album)`. Files that are not get moved into `root/sanitize(album)`.
//! Files without a readable album tag stay where they are.
//!
//! A move never replaces an existing file, and never lands on a path
//! reserved for another catalog entry's download; both cases leave the file
//! in place as a [`Relocation::Conflict`].

use crate::services::file_namer::sanitize;
use crate::services::tag_transfer::read_album;
use crate::utils::no_clobber::move_no_clobber;
use serde::Serialize;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Extensions swept by [`MetadataRelocator::relocate_tree`]
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "ogg", "opus", "wav"];

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Relocation {
    Moved { from: PathBuf, to: PathBuf },
    AlreadyFiled { path: PathBuf },
    /// No album tag; left in place
    NoAlbum { path: PathBuf },
    /// Target path is taken or reserved for another entry; left in place
    Conflict { path: PathBuf, occupied: PathBuf },
    Failed { path: PathBuf, reason: String },
}

impl Relocation {
    /// Where the file is after the call
    pub fn path(&self) -> &Path {
        match self {
            Relocation::Moved { to, .. } => to,
            Relocation::AlreadyFiled { path }
            | Relocation::NoAlbum { path }
            | Relocation::Conflict { path, .. }
            | Relocation::Failed { path, .. } => path,
        }
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, Relocation::Moved { .. })
    }
}

/// Counts from a tree sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelocationReport {
    pub scanned: usize,
    pub moved: usize,
    pub already_filed: usize,
    pub no_album: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl RelocationReport {
    fn record(&mut self, relocation: &Relocation) {
        self.scanned += 1;
        match relocation {
            Relocation::Moved { .. } => self.moved += 1,
            Relocation::AlreadyFiled { .. } => self.already_filed += 1,
            Relocation::NoAlbum { .. } => self.no_album += 1,
            Relocation::Conflict { .. } => self.conflicts += 1,
            Relocation::Failed { .. } => self.failed += 1,
        }
    }
}

/// Moves files into the folder named by their album tag
#[derive(Debug, Clone)]
pub struct MetadataRelocator {
    root: PathBuf,
    reserved: Arc<HashSet<PathBuf>>,
}

impl MetadataRelocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reserved: Arc::default(),
        }
    }

    /// Refuse to move files onto any of `reserved`
    pub fn with_reserved(mut self, reserved: HashSet<PathBuf>) -> Self {
        self.reserved = Arc::new(reserved);
        self
    }

    /// Relocate on the blocking pool
    pub async fn relocate(&self, path: &Path) -> Relocation {
        let relocator = self.clone();
        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || relocator.relocate_sync(&owned)).await {
            Ok(relocation) => relocation,
            Err(e) => Relocation::Failed {
                path: path.to_path_buf(),
                reason: format!("Relocation task failed: {}", e),
            },
        }
    }

    /// Relocate one file according to its album tag
    ///
    /// Never fails outright; every problem is reported through the result.
    pub fn relocate_sync(&self, path: &Path) -> Relocation {
        let Some(album) = read_album(path) else {
            tracing::debug!(path = %path.display(), "No album tag, leaving in place");
            return Relocation::NoAlbum {
                path: path.to_path_buf(),
            };
        };

        let folder_name = sanitize(album.trim());
        let current_folder = path.parent().and_then(|p| p.file_name());
        if current_folder.is_some_and(|name| name == folder_name.as_str()) {
            return Relocation::AlreadyFiled {
                path: path.to_path_buf(),
            };
        }

        let Some(file_name) = path.file_name() else {
            return Relocation::Failed {
                path: path.to_path_buf(),
                reason: "Path has no file name".to_string(),
            };
        };

        let target_folder = self.root.join(&folder_name);
        let target = target_folder.join(file_name);
        if self.reserved.contains(&target) {
            tracing::warn!(
                path = %path.display(),
                reserved = %target.display(),
                "Relocation target reserved for another catalog entry, leaving in place"
            );
            return Relocation::Conflict {
                path: path.to_path_buf(),
                occupied: target,
            };
        }

        if let Err(e) = std::fs::create_dir_all(&target_folder) {
            tracing::warn!(folder = %target_folder.display(), error = %e, "Failed to create album folder");
            return Relocation::Failed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
        }

        match move_no_clobber(path, &target) {
            Ok(()) => {
                tracing::info!(
                    from = %path.display(),
                    to = %target.display(),
                    album = %album,
                    "Moved to album folder"
                );
                Relocation::Moved {
                    from: path.to_path_buf(),
                    to: target,
                }
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(
                    path = %path.display(),
                    occupied = %target.display(),
                    "Relocation target already occupied, leaving in place"
                );
                Relocation::Conflict {
                    path: path.to_path_buf(),
                    occupied: target,
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    target = %target.display(),
                    kind = %crate::error::FailureKind::Filesystem,
                    error = %e,
                    "Move failed"
                );
                Relocation::Failed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Relocate every audio file under `root`
    ///
    /// Candidates are collected before anything moves, so files are visited
    /// once even when they land in a folder the walk has not reached yet.
    pub fn relocate_tree(&self) -> RelocationReport {
        let candidates: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_audio_file(path))
            .collect();

        let mut report = RelocationReport::default();
        for path in candidates {
            report.record(&self.relocate_sync(&path));
        }

        tracing::info!(
            root = %self.root.display(),
            scanned = report.scanned,
            moved = report.moved,
            already_filed = report.already_filed,
            no_album = report.no_album,
            conflicts = report.conflicts,
            failed = report.failed,
            "Relocation sweep complete"
        );
        report
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}
