// Test doubles shared by the integration tests
//
// ScriptedInput stands in for the microphone: tests push samples through the
// opened stream's render slot and inject track events.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use mic_capture::audio::{
    AudioInput, CaptureConstraints, CaptureStream, DeviceKind, InputDevice, RenderNode,
    RenderSlot, TrackEvent, TrackInfo,
};
use mic_capture::{CaptureError, Controls, Download, EncodedAudioFile, Guidance, Severity, StatusSink};
use tokio::sync::{mpsc, Notify};

/// Handle to a stream opened by [`ScriptedInput`]
#[derive(Clone)]
pub struct StreamHandle {
    slot: RenderSlot,
    stopped: Arc<AtomicBool>,
    events: mpsc::Sender<TrackEvent>,
}

impl StreamHandle {
    /// Deliver samples as the audio thread would
    pub fn render(&self, samples: &[f32]) {
        self.slot.render(samples);
    }

    pub fn send_event(&self, event: TrackEvent) {
        let _ = self.events.try_send(event);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.slot.is_attached()
    }
}

struct ScriptedStream {
    slot: RenderSlot,
    tracks: Vec<TrackInfo>,
    events: Option<mpsc::Receiver<TrackEvent>>,
    stopped: Arc<AtomicBool>,
}

impl CaptureStream for ScriptedStream {
    fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    fn connect(&mut self, node: Box<dyn RenderNode>) {
        self.slot.attach(node);
    }

    fn disconnect(&mut self) {
        self.slot.detach();
    }

    fn take_track_events(&mut self) -> Option<mpsc::Receiver<TrackEvent>> {
        self.events.take()
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.slot.detach();
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

pub struct ScriptedInput {
    devices: Vec<InputDevice>,
    track_count: usize,
    sample_rate: u32,
    failures: Mutex<VecDeque<CaptureError>>,
    opened: AtomicUsize,
    streams: Mutex<Vec<StreamHandle>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedInput {
    pub fn with_microphone() -> Self {
        Self::new(vec![device("mic", DeviceKind::AudioInput)], 1)
    }

    pub fn without_devices() -> Self {
        Self::new(Vec::new(), 1)
    }

    pub fn new(devices: Vec<InputDevice>, track_count: usize) -> Self {
        Self {
            devices,
            track_count,
            sample_rate: 44100,
            failures: Mutex::new(VecDeque::new()),
            opened: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Microphone whose `open` blocks until `gate` is notified
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::with_microphone()
        }
    }

    /// Make the next `open` fail with `err`
    pub fn fail_next_open(&self, err: CaptureError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn open_attempts(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_stream(&self) -> Option<StreamHandle> {
        self.streams.lock().unwrap().last().cloned()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

pub fn device(label: &str, kind: DeviceKind) -> InputDevice {
    InputDevice {
        id: label.to_string(),
        label: label.to_string(),
        kind,
    }
}

#[async_trait::async_trait]
impl AudioInput for ScriptedInput {
    async fn input_devices(&self) -> Result<Vec<InputDevice>, CaptureError> {
        Ok(self.devices.clone())
    }

    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        assert_eq!(constraints.sample_rate, 44100);
        assert_eq!(constraints.channels, 1);

        let (events_tx, events_rx) = mpsc::channel(8);
        let handle = StreamHandle {
            slot: RenderSlot::default(),
            stopped: Arc::new(AtomicBool::new(false)),
            events: events_tx,
        };
        let tracks = (0..self.track_count)
            .map(|i| TrackInfo {
                label: format!("scripted-{}", i),
                sample_rate: self.sample_rate,
                channels: 1,
            })
            .collect();

        self.streams.lock().unwrap().push(handle.clone());

        Ok(Box::new(ScriptedStream {
            slot: handle.slot.clone(),
            tracks,
            events: Some(events_rx),
            stopped: handle.stopped.clone(),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Status sink that records everything it is told
pub struct RecordingStatus {
    messages: Mutex<Vec<(Severity, String)>>,
    guidance: Mutex<Vec<Guidance>>,
    controls: Mutex<Vec<Controls>>,
    initial: Controls,
}

impl Default for RecordingStatus {
    fn default() -> Self {
        Self::with_controls(Controls::idle())
    }
}

impl RecordingStatus {
    pub fn with_controls(initial: Controls) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            guidance: Mutex::new(Vec::new()),
            controls: Mutex::new(Vec::new()),
            initial,
        }
    }

    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn last_message(&self) -> Option<(Severity, String)> {
        self.messages.lock().unwrap().last().cloned()
    }

    pub fn count(&self, severity: Severity, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, m)| *s == severity && m.contains(needle))
            .count()
    }

    pub fn guidance_shown(&self) -> Vec<Guidance> {
        self.guidance.lock().unwrap().clone()
    }

    pub fn controls_history(&self) -> Vec<Controls> {
        self.controls.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingStatus {
    fn status(&self, severity: Severity, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }

    fn controls(&self, controls: Controls) {
        self.controls.lock().unwrap().push(controls);
    }

    fn guidance(&self, guidance: Guidance) {
        self.guidance.lock().unwrap().push(guidance);
    }

    fn current_controls(&self) -> Controls {
        self.controls
            .lock()
            .unwrap()
            .last()
            .copied()
            .unwrap_or(self.initial)
    }
}

/// Download target that keeps files in memory
#[derive(Default)]
pub struct MemoryDownload {
    files: Mutex<Vec<EncodedAudioFile>>,
}

impl MemoryDownload {
    pub fn files(&self) -> Vec<EncodedAudioFile> {
        self.files.lock().unwrap().clone()
    }
}

impl Download for MemoryDownload {
    fn deliver(&self, file: &EncodedAudioFile) -> Result<PathBuf> {
        self.files.lock().unwrap().push(file.clone());
        Ok(PathBuf::from(&file.filename))
    }
}

/// Download target whose writes always fail
pub struct FailingDownload;

impl Download for FailingDownload {
    fn deliver(&self, _file: &EncodedAudioFile) -> Result<PathBuf> {
        anyhow::bail!("disk full")
    }
}

/// Sine with the given peak amplitude
pub fn tone(len: usize, peak: f32) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 0.0627).sin() * peak)
        .collect()
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
