use std::time::Duration;

use crate::audio::{CaptureConstraints, BLOCK_SIZE, DEFAULT_FFT_SIZE};
use crate::encode::EncoderSettings;

/// Configuration for a capture session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Constraints passed to the input when opening the microphone
    pub constraints: CaptureConstraints,

    /// Samples per block emitted by the worklet
    pub block_size: usize,

    /// Analyser FFT size
    pub fft_size: usize,

    /// Bound of the worklet -> session channel, in blocks
    pub worklet_channel_capacity: usize,

    /// Average byte-spectrum level below which the input counts as quiet
    pub low_signal_threshold: f32,

    /// How often the level check runs
    pub level_check_interval: Duration,

    /// Minimum gap between two low-signal status messages
    pub low_signal_warn_interval: Duration,

    /// How long stop waits for in-flight blocks
    pub flush_timeout: Duration,

    pub encoder: EncoderSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            block_size: BLOCK_SIZE,
            fft_size: DEFAULT_FFT_SIZE,
            worklet_channel_capacity: 64,
            low_signal_threshold: 2.0,
            level_check_interval: Duration::from_micros(16_667), // ~60 Hz
            low_signal_warn_interval: Duration::from_secs(1),
            flush_timeout: Duration::from_secs(2),
            encoder: EncoderSettings::default(),
        }
    }
}
