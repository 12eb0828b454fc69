//! Organizational tag subset carried across conversion
//!
//! Source tags are read with lofty (any container it can probe). The native
//! container gets an ID3v2.4 tag written with `id3`.
//!
//! Fields: title (TIT2), artist (TPE1), album (TALB), album artist (TPE2),
//! track (TRCK), genre (TCON), recording date (TDRC). Absent fields are
//! omitted, never written empty.

use id3::{TagLike, Timestamp, Version};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use std::path::Path;

/// Tag subset copied from the source container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track: Option<u32>,
    pub genre: Option<String>,
    /// Recording date as written in the source (`2004`, `2004-05-01`, ...)
    pub year: Option<String>,
}

impl AudioTags {
    /// Map a lofty tag of any container onto the subset
    ///
    /// Values are copied as written; only blank values are dropped.
    pub fn from_tag(tag: &Tag) -> Self {
        let year = non_blank(tag.get_string(&ItemKey::RecordingDate))
            .or_else(|| tag.year().map(|y| y.to_string()));

        Self {
            title: non_blank(tag.title()),
            artist: non_blank(tag.artist()),
            album: non_blank(tag.album()),
            album_artist: non_blank(tag.get_string(&ItemKey::AlbumArtist)),
            track: tag.track(),
            genre: non_blank(tag.genre()),
            year,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == AudioTags::default()
    }
}

fn non_blank(value: Option<impl Into<String>>) -> Option<String> {
    value.map(Into::into).filter(|s: &String| !s.trim().is_empty())
}

/// Read the tag subset from any container lofty understands
///
/// A file that probes fine but carries no tag yields empty [`AudioTags`].
pub fn read_tags(path: &Path) -> Result<AudioTags, String> {
    let tagged_file = Probe::open(path)
        .map_err(|e| e.to_string())?
        .read()
        .map_err(|e| e.to_string())?;

    Ok(tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .map(AudioTags::from_tag)
        .unwrap_or_default())
}

/// Parse a recording date, falling back to its leading year
fn parse_timestamp(value: &str) -> Option<Timestamp> {
    if let Ok(ts) = value.parse::<Timestamp>() {
        return Some(ts);
    }
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    digits.parse::<i32>().ok().map(|year| Timestamp {
        year,
        month: None,
        day: None,
        hour: None,
        minute: None,
        second: None,
    })
}

/// Build the ID3 tag for `tags`
pub fn to_id3(tags: &AudioTags) -> id3::Tag {
    let mut tag = id3::Tag::new();

    if let Some(title) = &tags.title {
        tag.set_title(title.as_str());
    }
    if let Some(artist) = &tags.artist {
        tag.set_artist(artist.as_str());
    }
    if let Some(album) = &tags.album {
        tag.set_album(album.as_str());
    }
    if let Some(album_artist) = &tags.album_artist {
        tag.set_album_artist(album_artist.as_str());
    }
    if let Some(track) = tags.track {
        tag.set_track(track);
    }
    if let Some(genre) = &tags.genre {
        tag.set_genre(genre.as_str());
    }
    if let Some(ts) = tags.year.as_deref().and_then(parse_timestamp) {
        tag.set_date_recorded(ts);
    }

    tag
}

/// Write `tags` as an ID3v2.4 tag, replacing any existing ID3 tag
pub fn write_id3(path: &Path, tags: &AudioTags) -> Result<(), String> {
    to_id3(tags)
        .write_to_path(path, Version::Id3v24)
        .map_err(|e| e.to_string())
}

/// Album tag of `path`, or `None` when absent, empty, or unreadable
///
/// `.mp3` files are read through `id3`; everything else through lofty.
pub fn read_album(path: &Path) -> Option<String> {
    let is_mp3 = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp3"));

    let album = if is_mp3 {
        match id3::Tag::read_from_path(path) {
            Ok(tag) => tag.album().map(str::to_string),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No readable ID3 tag");
                None
            }
        }
    } else {
        match read_tags(path) {
            Ok(tags) => tags.album,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No readable tag");
                None
            }
        }
    };

    non_blank(album)
}
