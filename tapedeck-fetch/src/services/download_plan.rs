//! Destination planning
//!
//! Every catalog entry gets its destination before anything is fetched:
//! folder `sanitize(album_context)`, file `sanitize(basename)`. Planning is a
//! pure function of the entry list, so the same catalog always maps to the
//! same paths.
//!
//! - An entry repeating an earlier `(resource_url, album_context)` pair is a
//!   duplicate and is never fetched.
//! - An entry whose destination would clash with an earlier, different entry
//!   gets ` (2)`, ` (3)`, ... appended to its file stem. A clash includes the
//!   post-conversion name, so `a.m4a` and `a.mp3` in one album do not both
//!   end up as `a.mp3`.

use crate::models::CatalogEntry;
use crate::services::file_namer::sanitize;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Unique,
    /// Same resource and album as entry `of`
    Duplicate { of: usize },
}

/// One catalog entry with its resolved destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEntry {
    /// Position in the catalog
    pub index: usize,
    pub entry: CatalogEntry,
    pub folder_name: String,
    pub file_name: String,
    pub disposition: Disposition,
    /// File name was suffixed to avoid a clash
    pub renamed: bool,
}

impl PlannedEntry {
    pub fn destination(&self, root: &Path) -> PathBuf {
        root.join(&self.folder_name).join(&self.file_name)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.disposition, Disposition::Duplicate { .. })
    }
}

/// Naming rules that decide what a file will be called after conversion
#[derive(Debug, Clone)]
pub struct PlanRules {
    pub convertible: Vec<String>,
    pub native_extension: String,
}

impl PlanRules {
    /// Names `file_name` may occupy over its lifetime
    fn occupied_names(&self, file_name: &str) -> Vec<String> {
        let mut names = vec![file_name.to_string()];
        if let Some((stem, ext)) = file_name.rsplit_once('.') {
            if self.convertible.iter().any(|c| c.eq_ignore_ascii_case(ext)) {
                names.push(format!("{}.{}", stem, self.native_extension));
            }
        }
        names
    }
}

impl Default for PlanRules {
    fn default() -> Self {
        Self {
            convertible: vec!["m4a".to_string()],
            native_extension: "mp3".to_string(),
        }
    }
}

/// `"Song.m4a"` + 2 → `"Song (2).m4a"`
fn suffixed(file_name: &str, n: usize) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", file_name, n),
    }
}

/// Resolve destinations for `entries` in catalog order
pub fn plan_downloads(entries: Vec<CatalogEntry>, rules: &PlanRules) -> Vec<PlannedEntry> {
    let mut first_seen: HashMap<(String, String), usize> = HashMap::new();
    let mut taken: HashSet<(String, String)> = HashSet::new();
    let mut planned: Vec<PlannedEntry> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let folder_name = sanitize(&entry.album_context);
        let natural_name = sanitize(entry.basename());

        let key = (entry.resource_url.clone(), entry.album_context.clone());
        if let Some(&of) = first_seen.get(&key) {
            let original = &planned[of];
            planned.push(PlannedEntry {
                index,
                folder_name: original.folder_name.clone(),
                file_name: original.file_name.clone(),
                entry,
                disposition: Disposition::Duplicate { of },
                renamed: original.renamed,
            });
            continue;
        }
        first_seen.insert(key, index);

        let is_free = |name: &str| {
            rules
                .occupied_names(name)
                .into_iter()
                .all(|n| !taken.contains(&(folder_name.clone(), n)))
        };

        let mut file_name = natural_name.clone();
        let mut n = 2;
        while !is_free(&file_name) {
            file_name = suffixed(&natural_name, n);
            n += 1;
        }
        let renamed = file_name != natural_name;

        if renamed {
            tracing::debug!(
                url = %entry.resource_url,
                folder = %folder_name,
                natural = %natural_name,
                planned = %file_name,
                "Destination clash, renamed"
            );
        }

        for name in rules.occupied_names(&file_name) {
            taken.insert((folder_name.clone(), name));
        }

        planned.push(PlannedEntry {
            index,
            entry,
            folder_name,
            file_name,
            disposition: Disposition::Unique,
            renamed,
        });
    }

    planned
}
