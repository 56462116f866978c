use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::info;

/// Summary of a saved recording
#[derive(Debug, Clone, Serialize)]
pub struct RecordingInfo {
    pub path: String,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: u64,
    pub duration_secs: f64,
}

impl RecordingInfo {
    /// Probe `path` and count its frames
    pub fn probe(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Inspecting recording: {}", path.display());

        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("Unsupported audio format")?;
        let mut format = probed.format;

        let track = format.default_track().context("No audio track found")?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let codec = symphonia::default::get_codecs()
            .get_codec(params.codec)
            .map(|descriptor| descriptor.short_name.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let sample_rate = params.sample_rate.unwrap_or(0);
        let channels = params.channels.map(|c| c.count()).unwrap_or(0);

        let frames = match params.n_frames {
            Some(frames) => frames,
            None => {
                let mut frames = 0u64;
                loop {
                    match format.next_packet() {
                        Ok(packet) if packet.track_id() == track_id => frames += packet.dur,
                        Ok(_) => {}
                        Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                            break
                        }
                        Err(e) => return Err(e).context("Failed to read packets"),
                    }
                }
                frames
            }
        };

        let duration_secs = if sample_rate > 0 {
            frames as f64 / sample_rate as f64
        } else {
            0.0
        };

        Ok(Self {
            path: path.display().to_string(),
            codec,
            sample_rate,
            channels,
            frames,
            duration_secs,
        })
    }
}
