use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::{CaptureConstraints, BLOCK_SIZE, DEFAULT_FFT_SIZE};
use crate::encode::{AudioFormat, EncoderSettings, SILENCE_THRESHOLD};
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub encoder: EncoderConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "mic-capture".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub block_size: usize,
    pub fft_size: usize,
    pub worklet_channel_capacity: usize,
    pub low_signal_threshold: f32,
    pub silence_threshold: f32,
    pub level_check_hz: u32,
    pub low_signal_warn_interval_ms: u64,
    pub flush_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            block_size: BLOCK_SIZE,
            fft_size: DEFAULT_FFT_SIZE,
            worklet_channel_capacity: 64,
            low_signal_threshold: 2.0,
            silence_threshold: SILENCE_THRESHOLD,
            level_check_hz: 60,
            low_signal_warn_interval_ms: 1000,
            flush_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub format: AudioFormat,
    pub bitrate_kbps: u32,
    /// Filename prefix for saved recordings
    pub label: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            bitrate_kbps: 128,
            label: "recording".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub recordings_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            recordings_path: "recordings".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (any extension the config crate knows) over the defaults.
    /// A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        let audio = &self.audio;
        SessionConfig {
            constraints: CaptureConstraints {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                echo_cancellation: audio.echo_cancellation,
                noise_suppression: audio.noise_suppression,
                auto_gain_control: audio.auto_gain_control,
            },
            block_size: audio.block_size,
            fft_size: audio.fft_size,
            worklet_channel_capacity: audio.worklet_channel_capacity,
            low_signal_threshold: audio.low_signal_threshold,
            level_check_interval: Duration::from_secs_f64(1.0 / audio.level_check_hz.max(1) as f64),
            low_signal_warn_interval: Duration::from_millis(audio.low_signal_warn_interval_ms),
            flush_timeout: Duration::from_millis(audio.flush_timeout_ms),
            encoder: EncoderSettings {
                format: self.encoder.format,
                bitrate_kbps: self.encoder.bitrate_kbps,
                label: self.encoder.label.clone(),
                silence_threshold: audio.silence_threshold,
            },
        }
    }
}
