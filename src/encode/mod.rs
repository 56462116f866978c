//! Float PCM to compressed file
//!
//! Blocks are validated (non-empty, above the silence threshold), merged,
//! scaled to 16-bit and streamed through a [`FrameEncoder`] in codec-sized
//! frames. The encoder's flush output is appended last.

mod mp3;
pub mod pcm;
mod wav;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::AudioBlock;
use crate::error::EncodeError;

pub use mp3::Mp3FrameEncoder;
pub use pcm::SILENCE_THRESHOLD;
pub use wav::WavFrameEncoder;

/// Samples per MP3 frame
pub const FRAME_SAMPLES: usize = 1152;

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    /// File extension for a MIME type. No type means `webm`, unknown types `wav`.
    pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
        let Some(mime) = mime else {
            return "webm";
        };
        if mime.contains("webm") {
            "webm"
        } else if mime.contains("ogg") {
            "ogg"
        } else if mime.contains("mp4") {
            "mp4"
        } else if mime.contains("mpeg") {
            "mp3"
        } else {
            "wav"
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" | "audio/mpeg" | "audio/mp3" => Ok(AudioFormat::Mp3),
            "wav" | "audio/wav" => Ok(AudioFormat::Wav),
            other => anyhow::bail!("unsupported audio format: {}", other),
        }
    }
}

/// A block-based audio encoder
pub trait FrameEncoder {
    fn format(&self) -> AudioFormat;

    /// Encode one frame of samples; may return no bytes while the codec buffers
    fn encode_frame(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncodeError>;

    /// Drain whatever the codec still holds
    fn flush(&mut self) -> Result<Vec<u8>, EncodeError>;
}

pub fn create_encoder(
    format: AudioFormat,
    sample_rate: u32,
    bitrate_kbps: u32,
) -> Result<Box<dyn FrameEncoder>, EncodeError> {
    match format {
        AudioFormat::Mp3 => Ok(Box::new(Mp3FrameEncoder::new(sample_rate, bitrate_kbps)?)),
        AudioFormat::Wav => Ok(Box::new(WavFrameEncoder::new(sample_rate))),
    }
}

/// An encoded recording ready for download
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudioFile {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    pub sample_rate: u32,
    /// PCM samples fed to the encoder
    pub sample_count: usize,
    /// Suggested filename, `<label>_<YYYYMMDD>_<HHMMSS>.<ext>`
    pub filename: String,
}

impl EncodedAudioFile {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }
}

pub fn suggested_filename(label: &str, format: AudioFormat, now: NaiveDateTime) -> String {
    format!(
        "{}_{}.{}",
        label,
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Stream samples through `encoder` in [`FRAME_SAMPLES`] chunks, then flush
pub fn encode_samples(
    samples: &[i16],
    encoder: &mut dyn FrameEncoder,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for frame in samples.chunks(FRAME_SAMPLES) {
        let bytes = encoder.encode_frame(frame)?;
        out.extend_from_slice(&bytes);
    }
    out.extend_from_slice(&encoder.flush()?);
    Ok(out)
}

/// Encoder settings for a capture session
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub format: AudioFormat,
    pub bitrate_kbps: u32,
    /// Filename prefix
    pub label: String,
    pub silence_threshold: f32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            bitrate_kbps: 128,
            label: "recording".to_string(),
            silence_threshold: SILENCE_THRESHOLD,
        }
    }
}

/// Turns captured blocks into an [`EncodedAudioFile`]
pub struct Encoder {
    settings: EncoderSettings,
}

impl Encoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    pub fn encode(
        &self,
        blocks: &[AudioBlock],
        sample_rate: u32,
        now: NaiveDateTime,
    ) -> Result<EncodedAudioFile, EncodeError> {
        let mut encoder =
            create_encoder(self.settings.format, sample_rate, self.settings.bitrate_kbps)?;
        self.encode_with(blocks, sample_rate, now, encoder.as_mut())
    }

    /// Like [`Encoder::encode`] with a caller-provided codec
    pub fn encode_with(
        &self,
        blocks: &[AudioBlock],
        sample_rate: u32,
        now: NaiveDateTime,
        encoder: &mut dyn FrameEncoder,
    ) -> Result<EncodedAudioFile, EncodeError> {
        info!("Processing recording: {} blocks", blocks.len());

        let merged = pcm::validate_blocks(blocks, self.settings.silence_threshold)?;
        debug!(
            "Merged {} samples, peak amplitude {:.6}",
            merged.len(),
            pcm::peak_amplitude(&merged)
        );

        let samples = pcm::to_i16_samples(&merged);
        let bytes = encode_samples(&samples, encoder)?;

        let format = encoder.format();
        info!(
            "Encoded {} samples to {} bytes of {}",
            samples.len(),
            bytes.len(),
            format
        );

        Ok(EncodedAudioFile {
            bytes,
            format,
            sample_rate,
            sample_count: samples.len(),
            filename: suggested_filename(&self.settings.label, format, now),
        })
    }
}
