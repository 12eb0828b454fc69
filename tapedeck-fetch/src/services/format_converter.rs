//! Non-native container conversion
//!
//! The source is decoded with symphonia and streamed as raw f32 PCM into an
//! external encoder process (ffmpeg-compatible arguments) that writes
//! `<stem>.<native>.part`. The tag subset is then written onto the partial
//! file, which is moved into place (never over an existing file) before the
//! original is deleted.
//!
//! Any failure removes the partial file and leaves the original untouched.

use crate::error::ConversionError;
use crate::services::download_plan::PlanRules;
use crate::services::downloader::partial_path;
use crate::services::file_namer::extension_of;
use crate::services::tag_transfer::{self, AudioTags};
use crate::utils::audio_decoder::{decode_interleaved, StreamInfo};
use crate::utils::no_clobber::move_no_clobber;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tapedeck_common::config::ConvertConfig;

/// Result of one conversion attempt
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    /// Converted; the original no longer exists
    Converted {
        from: PathBuf,
        to: PathBuf,
        tags: AudioTags,
    },
    /// Original kept at `path`
    Failed { path: PathBuf, error: String },
}

impl ConversionOutcome {
    /// Path of the file that exists after the attempt
    pub fn path(&self) -> &Path {
        match self {
            ConversionOutcome::Converted { to, .. } => to,
            ConversionOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }
}

/// Converts files into the native container
#[derive(Debug, Clone)]
pub struct FormatConverter {
    encoder: String,
    bitrate_kbps: u32,
    extensions: Vec<String>,
    native_extension: String,
}

impl FormatConverter {
    pub fn new(config: &ConvertConfig) -> Self {
        Self {
            encoder: config.encoder.clone(),
            bitrate_kbps: config.bitrate_kbps,
            extensions: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
            native_extension: config.native_extension.to_lowercase(),
        }
    }

    /// True when `path` carries one of the configured convertible extensions
    pub fn is_convertible(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        extension_of(name).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Planner rules matching this converter
    pub fn plan_rules(&self) -> PlanRules {
        PlanRules {
            convertible: self.extensions.clone(),
            native_extension: self.native_extension.clone(),
        }
    }

    /// `<stem>.<native>` next to `path`
    pub fn target_path(&self, path: &Path) -> PathBuf {
        path.with_extension(&self.native_extension)
    }

    /// Convert on the blocking pool
    pub async fn convert(&self, path: &Path) -> ConversionOutcome {
        let converter = self.clone();
        let source = path.to_path_buf();

        let result = tokio::task::spawn_blocking(move || converter.convert_blocking(&source))
            .await
            .unwrap_or_else(|e| Err(ConversionError::Task(e.to_string())));

        match result {
            Ok((to, tags)) => {
                tracing::info!(
                    from = %path.display(),
                    to = %to.display(),
                    "Converted"
                );
                ConversionOutcome::Converted {
                    from: path.to_path_buf(),
                    to,
                    tags,
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    kind = %crate::error::FailureKind::Conversion,
                    error = %e,
                    "Conversion failed, keeping original"
                );
                ConversionOutcome::Failed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Convert and return whichever path exists afterwards
    pub async fn convert_path(&self, path: &Path) -> PathBuf {
        self.convert(path).await.path().to_path_buf()
    }

    /// Synchronous conversion; returns the new path and the tags written
    pub fn convert_blocking(&self, source: &Path) -> Result<(PathBuf, AudioTags), ConversionError> {
        let name = source.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if extension_of(name).as_deref() == Some(self.native_extension.as_str()) {
            return Err(ConversionError::AlreadyNative(source.display().to_string()));
        }

        let target = self.target_path(source);
        let part = partial_path(&target);

        match self.convert_into(source, &part, &target) {
            Ok(tags) => {
                discard_source(source, &target);
                Ok((target, tags))
            }
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&part) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %part.display(), error = %rm, "Failed to remove partial conversion");
                    }
                }
                Err(e)
            }
        }
    }

    fn convert_into(&self, source: &Path, part: &Path, target: &Path) -> Result<AudioTags, ConversionError> {
        let tags = tag_transfer::read_tags(source).map_err(ConversionError::TagRead)?;
        if tags.is_empty() {
            tracing::debug!(source = %source.display(), "Source carries no tags");
        }

        self.encode(source, part)?;

        tag_transfer::write_id3(part, &tags).map_err(ConversionError::TagWrite)?;
        move_no_clobber(part, target)?;

        tracing::debug!(
            target = %target.display(),
            title = ?tags.title,
            album = ?tags.album,
            "Tags carried across conversion"
        );
        Ok(tags)
    }

    /// Decode `source` and pipe PCM into the encoder writing `part`
    fn encode(&self, source: &Path, part: &Path) -> Result<(), ConversionError> {
        let mut child: Option<Child> = None;
        let mut bytes: Vec<u8> = Vec::new();

        let decoded = decode_interleaved(source, |info, samples| {
            if child.is_none() {
                child = Some(self.spawn_encoder(info, part)?);
            }
            let stdin = child
                .as_mut()
                .and_then(|c| c.stdin.as_mut())
                .ok_or_else(|| anyhow::anyhow!("Encoder stdin closed"))?;

            bytes.clear();
            bytes.reserve(samples.len() * 4);
            for sample in samples {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            stdin.write_all(&bytes)?;
            Ok(())
        });

        match (decoded, child) {
            (Ok(stats), Some(mut child)) => {
                drop(child.stdin.take());
                let output = child.wait_with_output()?;
                if !output.status.success() {
                    return Err(ConversionError::EncoderFailed {
                        status: output.status.to_string(),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                tracing::debug!(
                    source = %source.display(),
                    duration_s = format!("{:.1}", stats.duration_seconds()),
                    skipped_packets = stats.skipped_packets,
                    "Encoder finished"
                );
                Ok(())
            }
            (Ok(_), None) => Err(ConversionError::Decode("no audio frames".to_string())),
            (Err(e), Some(mut child)) => {
                // A dead encoder shows up as a broken pipe; its exit status is the real error
                drop(child.stdin.take());
                match child.wait_with_output() {
                    Ok(output) if !output.status.success() => Err(ConversionError::EncoderFailed {
                        status: output.status.to_string(),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    }),
                    _ => Err(ConversionError::Decode(format!("{:#}", e))),
                }
            }
            (Err(e), None) => Err(match e.downcast::<ConversionError>() {
                Ok(conversion_error) => conversion_error,
                Err(e) => ConversionError::Decode(format!("{:#}", e)),
            }),
        }
    }

    fn encoder_args(&self, info: StreamInfo, part: &Path) -> Vec<String> {
        let out_channels = info.channels.clamp(1, 2);
        vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            "f32le".to_string(),
            "-ar".to_string(),
            info.sample_rate.to_string(),
            "-ac".to_string(),
            info.channels.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-vn".to_string(),
            "-codec:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", self.bitrate_kbps),
            "-ac".to_string(),
            out_channels.to_string(),
            "-f".to_string(),
            "mp3".to_string(),
            part.to_string_lossy().to_string(),
        ]
    }

    fn spawn_encoder(&self, info: StreamInfo, part: &Path) -> Result<Child, ConversionError> {
        tracing::debug!(
            encoder = %self.encoder,
            sample_rate = info.sample_rate,
            channels = info.channels,
            bitrate_kbps = self.bitrate_kbps,
            "Starting encoder"
        );
        Command::new(&self.encoder)
            .args(self.encoder_args(info, part))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ConversionError::EncoderSpawn {
                program: self.encoder.clone(),
                reason: e.to_string(),
            })
    }
}

/// Remove the original once the converted file is in place
///
/// A source that cannot be removed is logged and left behind; the
/// conversion itself still counts.
fn discard_source(source: &Path, converted: &Path) {
    if let Err(e) = std::fs::remove_file(source) {
        tracing::warn!(
            path = %source.display(),
            converted = %converted.display(),
            error = %e,
            "Converted, but failed to remove the original"
        );
    }
}
