use super::config::SessionConfig;
use super::session::CaptureSession;
use super::stats::SessionStats;
use crate::audio::{AudioBlock, AudioInput, DeviceKind, TrackEvent};
use crate::download::Download;
use crate::encode::{EncodedAudioFile, Encoder};
use crate::error::{CaptureError, EncodeError};
use crate::status::{Controls, Guidance, Severity, StatusSink};
use chrono::Local;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A recording that was encoded and delivered
#[derive(Debug, Clone)]
pub struct SavedRecording {
    pub path: PathBuf,
    pub file: EncodedAudioFile,
}

/// Result of [`CaptureSessionManager::stop`]
#[derive(Debug)]
pub enum StopOutcome {
    /// Nothing was recording; no state changed
    NotRecording,
    /// Microphone acquisition has not finished yet; no state changed
    StartPending,
    Saved(SavedRecording),
    /// Nothing usable was captured (empty or silent)
    Discarded(EncodeError),
    /// Encoding or delivery failed
    SaveFailed(String),
}

enum SessionState {
    Idle,
    Starting,
    Recording(CaptureSession),
}

struct Shared {
    input: Arc<dyn AudioInput>,
    config: SessionConfig,
    status: Arc<dyn StatusSink>,
    download: Arc<dyn Download>,
    state: Mutex<SessionState>,
}

/// Owns at most one capture session at a time
///
/// Every failure is reported through the [`StatusSink`]; the returned values
/// let callers react programmatically.
#[derive(Clone)]
pub struct CaptureSessionManager {
    shared: Arc<Shared>,
}

impl CaptureSessionManager {
    pub fn new(
        input: Arc<dyn AudioInput>,
        config: SessionConfig,
        status: Arc<dyn StatusSink>,
        download: Arc<dyn Download>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                input,
                config,
                status,
                download,
                state: Mutex::new(SessionState::Idle),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Start recording
    pub async fn start(&self) -> Result<(), CaptureError> {
        let status = &self.shared.status;

        if !status.current_controls().record {
            let err = CaptureError::RecordingUnavailable;
            status.status(Severity::Error, &err.remediation());
            return Err(err);
        }

        {
            let mut state = self.shared.state.lock().await;
            if !matches!(*state, SessionState::Idle) {
                debug!("Start ignored: a session is already active");
                return Err(CaptureError::Busy);
            }
            *state = SessionState::Starting;
        }

        info!("Starting capture using {}", self.shared.input.name());

        match self.acquire().await {
            Ok(mut session) => {
                let mut state = self.shared.state.lock().await;
                if let Some(events) = session.take_track_events() {
                    let watcher = tokio::spawn(watch_tracks(
                        Arc::downgrade(&self.shared),
                        session.id(),
                        events,
                    ));
                    session.attach_task(watcher);
                }
                info!("Capture session {} recording", session.id());
                *state = SessionState::Recording(session);
                drop(state);

                status.controls(Controls::recording());
                status.status(Severity::Success, "Microphone recording started.");
                Ok(())
            }
            Err(err) => {
                *self.shared.state.lock().await = SessionState::Idle;
                self.report_start_failure(&err);
                status.controls(Controls::idle());
                Err(err)
            }
        }
    }

    async fn acquire(&self) -> Result<CaptureSession, CaptureError> {
        let config = &self.shared.config;

        let devices = self.shared.input.input_devices().await?;
        let input_count = devices
            .iter()
            .filter(|device| device.kind == DeviceKind::AudioInput)
            .count();
        if input_count == 0 {
            return Err(CaptureError::DeviceNotFound);
        }
        debug!("{} audio input device(s) available", input_count);

        let mut stream = self.shared.input.open(&config.constraints).await?;
        if stream.tracks().is_empty() {
            stream.stop();
            return Err(CaptureError::NoAudioTrack);
        }
        for track in stream.tracks() {
            info!(
                "Using input device: {} ({}Hz, {} channel)",
                track.label, track.sample_rate, track.channels
            );
        }

        // From here on, an early return drops the session and releases the stream
        let mut session = CaptureSession::new(stream, config, self.shared.status.clone());
        let analyser = session.begin(config)?;
        session.spawn_level_check(analyser, config);

        Ok(session)
    }

    fn report_start_failure(&self, err: &CaptureError) {
        error!("Failed to start recording: {}", err);

        let status = &self.shared.status;
        match err {
            CaptureError::PermissionDenied => status.guidance(Guidance::PermissionDenied),
            CaptureError::DeviceNotFound => status.guidance(Guidance::DeviceNotFound),
            _ => {}
        }
        status.status(
            Severity::Error,
            &format!("Failed to start recording: {}", err.remediation()),
        );
    }

    /// Stop recording, encode what was captured and deliver it
    ///
    /// The session is torn down on every path once it was recording.
    pub async fn stop(&self) -> StopOutcome {
        let status = &self.shared.status;
        let mut state = self.shared.state.lock().await;

        let mut session = match std::mem::replace(&mut *state, SessionState::Idle) {
            SessionState::Recording(session) => session,
            SessionState::Idle => {
                status.status(Severity::Info, "No recording in progress.");
                return StopOutcome::NotRecording;
            }
            SessionState::Starting => {
                *state = SessionState::Starting;
                warn!("Stop requested while the microphone is still being acquired");
                status.status(
                    Severity::Warn,
                    "The microphone is still being acquired; stop again once recording has started.",
                );
                return StopOutcome::StartPending;
            }
        };

        info!("Stopping capture session {}", session.id());
        status.status(Severity::Info, "Stopping recording and processing data...");

        session.flush(self.shared.config.flush_timeout).await;
        let blocks = session.finish();
        let outcome = self.save(&blocks, session.sample_rate());

        drop(session);
        outcome
    }

    fn save(&self, blocks: &[AudioBlock], sample_rate: u32) -> StopOutcome {
        let status = &self.shared.status;
        let encoder = Encoder::new(self.shared.config.encoder.clone());

        let file = match encoder.encode(blocks, sample_rate, Local::now().naive_local()) {
            Ok(file) => file,
            Err(err) if err.is_soft() => {
                warn!("Recording discarded: {}", err);
                let message = match err {
                    EncodeError::NoAudioData => "No audio data was recorded, nothing was saved. Make sure the microphone works and is close to the sound source.",
                    _ => "No usable audio was recorded, nothing was saved. Make sure the microphone works and is close to the sound source.",
                };
                status.status(Severity::Warn, message);
                return StopOutcome::Discarded(err);
            }
            Err(err) => {
                error!("Failed to encode recording: {}", err);
                status.status(
                    Severity::Error,
                    "Failed to save the recording, see the log for details.",
                );
                return StopOutcome::SaveFailed(err.to_string());
            }
        };

        match self.shared.download.deliver(&file) {
            Ok(path) => {
                status.status(
                    Severity::Success,
                    &format!(
                        "Recording saved as {}!",
                        file.format.extension().to_uppercase()
                    ),
                );
                StopOutcome::Saved(SavedRecording { path, file })
            }
            Err(err) => {
                error!("Failed to save recording: {:#}", err);
                status.status(
                    Severity::Error,
                    "Failed to save the recording, see the log for details.",
                );
                StopOutcome::SaveFailed(format!("{:#}", err))
            }
        }
    }

    pub async fn is_recording(&self) -> bool {
        matches!(*self.shared.state.lock().await, SessionState::Recording(_))
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        match &*self.shared.state.lock().await {
            SessionState::Recording(session) => session.stats(),
            _ => SessionStats::idle(),
        }
    }
}

async fn watch_tracks(
    shared: Weak<Shared>,
    session_id: Uuid,
    mut events: mpsc::Receiver<TrackEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        match event {
            TrackEvent::Muted => {
                warn!("Audio track muted");
                shared
                    .status
                    .status(Severity::Warn, "Warning: the microphone may be muted.");
            }
            TrackEvent::Unmuted => info!("Audio track unmuted"),
            TrackEvent::Ended => {
                info!("Audio track ended");
                let mut state = shared.state.lock().await;
                let current = matches!(
                    &*state,
                    SessionState::Recording(session) if session.id() == session_id
                );
                if current {
                    shared.status.status(
                        Severity::Warn,
                        "The microphone stopped delivering audio; recording ended.",
                    );
                    // Dropping the session tears it down (and aborts this task)
                    *state = SessionState::Idle;
                }
                break;
            }
        }
    }
}
