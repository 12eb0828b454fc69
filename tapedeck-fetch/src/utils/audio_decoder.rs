//! Audio Decoding Utilities
//!
//! **Purpose:** Stream a container's default audio track as interleaved f32
//! PCM, one decoded packet at a time, so long tracks never sit in memory whole.
//!
//! Uses symphonia for format-agnostic decoding (AAC/M4A, MP3, FLAC, etc.)

use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Stream layout, known once the first packet is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Totals for a finished decode
#[derive(Debug, Clone, Copy)]
pub struct DecodeStats {
    pub info: StreamInfo,
    /// Frames (samples per channel) delivered
    pub frames: u64,
    /// Packets skipped because they failed to decode
    pub skipped_packets: u64,
}

impl DecodeStats {
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.info.sample_rate as f64
    }
}

/// Decode `file_path` and hand each packet's interleaved samples to `sink`
///
/// **Algorithm:**
/// 1. Probe the container (extension used as a hint)
/// 2. Pick the first track with a real codec
/// 3. Decode packet by packet into an f32 `SampleBuffer`
/// 4. Call `sink(info, samples)`; an error from the sink stops decoding
///
/// Corrupt packets are skipped and counted. A stream that yields no audio at
/// all is an error.
pub fn decode_interleaved<F>(file_path: &Path, mut sink: F) -> Result<DecodeStats>
where
    F: FnMut(StreamInfo, &[f32]) -> Result<()>,
{
    tracing::debug!(path = %file_path.display(), "Decoding audio file");

    let file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open audio file: {}", file_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", file_path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", file_path.display()))?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut info: Option<StreamInfo> = None;
    let mut frames = 0u64;
    let mut skipped_packets = 0u64;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(anyhow::anyhow!("Error reading packet: {}", e));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(path = %file_path.display(), error = %e, "Skipping corrupt packet");
                skipped_packets += 1;
                continue;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to decode packet in {}: {}",
                    file_path.display(),
                    e
                ));
            }
        };

        let spec = *decoded.spec();
        let stream = *info.get_or_insert(StreamInfo {
            sample_rate: spec.rate,
            channels: spec.channels.count(),
        });

        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * stream.channels {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);

        let samples = buf.samples();
        if samples.is_empty() {
            continue;
        }
        frames += (samples.len() / stream.channels.max(1)) as u64;
        sink(stream, samples)?;
    }

    let info = info.with_context(|| format!("No audio decoded from: {}", file_path.display()))?;

    tracing::debug!(
        path = %file_path.display(),
        sample_rate = info.sample_rate,
        channels = info.channels,
        frames = frames,
        skipped_packets = skipped_packets,
        "Audio decoding complete"
    );

    Ok(DecodeStats {
        info,
        frames,
        skipped_packets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fixtures::write_test_wav;

    #[test]
    fn test_decode_file_not_found() {
        let result = decode_interleaved(Path::new("/nonexistent/file.m4a"), |_, _| Ok(()));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to open audio file"));
    }

    #[test]
    fn test_decode_garbage_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.m4a");
        std::fs::write(&path, b"definitely not an mpeg-4 container").unwrap();

        let mut calls = 0;
        let result = decode_interleaved(&path, |_, _| {
            calls += 1;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_decode_wav_streams_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 8000, 2, 800);

        let mut seen = 0usize;
        let mut layout = None;
        let stats = decode_interleaved(&path, |info, samples| {
            layout = Some(info);
            seen += samples.len();
            Ok(())
        })
        .unwrap();

        assert_eq!(layout, Some(StreamInfo { sample_rate: 8000, channels: 2 }));
        assert_eq!(stats.frames, 800);
        assert_eq!(seen, 1600);
    }

    #[test]
    fn test_sink_error_stops_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 8000, 1, 8000);

        let result = decode_interleaved(&path, |_, _| Err(anyhow::anyhow!("encoder closed")));
        assert!(result.unwrap_err().to_string().contains("encoder closed"));
    }
}
