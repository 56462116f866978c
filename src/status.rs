// User-facing status surface
//
// The capture session reports progress through a StatusSink: a status line
// with a severity, the enabled state of the record/download/playback controls,
// and guidance for device and permission problems.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

/// Enabled state of the user controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub record: bool,
    pub download: bool,
    pub playback: bool,
}

impl Controls {
    /// Nothing recording: record enabled, download disabled
    pub fn idle() -> Self {
        Self {
            record: true,
            download: false,
            playback: true,
        }
    }

    /// Recording: record disabled, download (stop and save) enabled
    pub fn recording() -> Self {
        Self {
            record: false,
            download: true,
            playback: true,
        }
    }
}

/// Remediation shown for device and permission failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guidance {
    PermissionDenied,
    DeviceNotFound,
}

impl Guidance {
    pub fn title(&self) -> &'static str {
        match self {
            Guidance::PermissionDenied => "Microphone permission required",
            Guidance::DeviceNotFound => "Microphone not found",
        }
    }

    pub fn steps(&self) -> &'static [&'static str] {
        match self {
            Guidance::PermissionDenied => &[
                "Open the system privacy settings",
                "Find the microphone permission list",
                "Allow this application to use the microphone",
                "Start the recording again",
            ],
            Guidance::DeviceNotFound => &[
                "Check that the microphone is plugged in",
                "Make sure it is selected as the default input device",
                "Start the recording again",
            ],
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn status(&self, severity: Severity, message: &str);

    fn controls(&self, controls: Controls);

    fn guidance(&self, guidance: Guidance);

    /// Last controls value pushed
    fn current_controls(&self) -> Controls;
}

/// Status sink that logs everything through tracing
pub struct ConsoleStatus {
    controls: Mutex<Controls>,
}

impl ConsoleStatus {
    pub fn new() -> Self {
        Self {
            controls: Mutex::new(Controls::idle()),
        }
    }
}

impl Default for ConsoleStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for ConsoleStatus {
    fn status(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info | Severity::Success => info!("[{:?}] {}", severity, message),
            Severity::Warn => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }
    }

    fn controls(&self, controls: Controls) {
        *self.controls.lock().unwrap_or_else(PoisonError::into_inner) = controls;
    }

    fn guidance(&self, guidance: Guidance) {
        warn!("{}", guidance.title());
        for (i, step) in guidance.steps().iter().enumerate() {
            warn!("  {}. {}", i + 1, step);
        }
    }

    fn current_controls(&self) -> Controls {
        *self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
