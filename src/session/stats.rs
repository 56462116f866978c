use chrono::{DateTime, Utc};
use serde::Serialize;

/// Statistics about the current capture session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    /// Whether recording is currently active
    pub is_recording: bool,

    /// When the recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Elapsed recording time in seconds
    pub duration_secs: f64,

    /// Blocks accumulated so far
    pub blocks_captured: usize,

    /// Samples accumulated so far
    pub samples_captured: usize,

    /// Sample rate of the capture graph
    pub sample_rate: u32,
}

impl SessionStats {
    pub fn idle() -> Self {
        Self {
            is_recording: false,
            started_at: None,
            duration_secs: 0.0,
            blocks_captured: 0,
            samples_captured: 0,
            sample_rate: 0,
        }
    }
}
