//! Audio fixture builders

use hound::{WavSpec, WavWriter};
use id3::TagLike;
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::id3::v2::Id3v2Tag;
use lofty::tag::Accessor;
use std::path::Path;

/// Fake MP3 body with an ID3v2.4 tag in front
///
/// Only the tag is real; the payload is filler, which is all the relocator
/// needs.
pub fn tagged_mp3_bytes(title: &str, album: Option<&str>) -> Vec<u8> {
    let mut tag = id3::Tag::new();
    tag.set_title(title);
    if let Some(album) = album {
        tag.set_album(album);
    }

    let mut bytes = Vec::new();
    tag.write_to(&mut bytes, id3::Version::Id3v24).unwrap();
    bytes.extend(std::iter::repeat(0xAAu8).take(2048));
    bytes
}

/// Filler bytes with no tag of any kind
pub fn untagged_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Short stereo tone with ID3v2 title/artist/album
pub fn write_tagged_wav(path: &Path, title: &str, artist: &str, album: &str) {
    let spec = WavSpec {
        channels: 2,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..22050u32 {
        let t = i as f32 / spec.sample_rate as f32;
        let sample = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3 * 32767.0) as i16;
        writer.write_sample(sample).unwrap();
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    let mut tagged_file = lofty::probe::Probe::open(path).unwrap().read().unwrap();
    let mut tag = Id3v2Tag::default();
    tag.set_title(title.to_string());
    tag.set_artist(artist.to_string());
    tag.set_album(album.to_string());
    tag.set_track(7);
    tag.set_year(1972);
    tagged_file.insert_tag(tag.into());
    tagged_file.save_to_path(path, WriteOptions::default()).unwrap();
}
