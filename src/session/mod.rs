//! Capture session management
//!
//! This module provides the `CaptureSessionManager` that manages:
//! - Device enumeration and microphone acquisition
//! - The capture graph (worklet + analyser) and block accumulation
//! - Signal-level and track-state monitoring
//! - Encoding and delivery on stop, with teardown on every exit path

mod config;
mod manager;
mod session;
mod stats;

pub use config::SessionConfig;
pub use manager::{CaptureSessionManager, SavedRecording, StopOutcome};
pub use session::{BlockCollector, CaptureSession};
pub use stats::SessionStats;
