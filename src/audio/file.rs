use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{
    AudioInput, CaptureConstraints, CaptureStream, DeviceKind, InputDevice, RenderNode,
    RenderSlot, TrackEvent, TrackInfo, RENDER_QUANTUM,
};
use crate::error::CaptureError;

/// A WAV file decoded to mono f32 samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    /// Channel count of the file (samples are already downmixed)
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let channels = spec.channels.max(1) as usize;
        let samples: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} frames",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Input backend that replays a WAV file as a live microphone
pub struct FileInput {
    path: PathBuf,
    paced: bool,
}

impl FileInput {
    /// Replay in real time
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            paced: true,
        }
    }

    /// Replay as fast as the render thread can go
    ///
    /// Blocks beyond the worklet channel capacity may be dropped if the
    /// control thread does not keep up.
    pub fn unpaced(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            paced: false,
        }
    }

    fn label(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[async_trait::async_trait]
impl AudioInput for FileInput {
    async fn input_devices(&self) -> Result<Vec<InputDevice>, CaptureError> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        Ok(vec![InputDevice {
            id: self.path.display().to_string(),
            label: self.label(),
            kind: DeviceKind::AudioInput,
        }])
    }

    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|_| CaptureError::Aborted)?
            .map_err(|e| {
                error!("File input unavailable: {:#}", e);
                if self.path.exists() {
                    CaptureError::DeviceUnavailable
                } else {
                    CaptureError::DeviceNotFound
                }
            })?;

        if audio.sample_rate != constraints.sample_rate {
            warn!(
                "File sample rate {}Hz differs from requested {}Hz; samples are not resampled",
                audio.sample_rate, constraints.sample_rate
            );
        }

        let (events_tx, events_rx) = mpsc::channel(8);
        let track = TrackInfo {
            label: self.label(),
            sample_rate: audio.sample_rate,
            channels: 1,
        };

        Ok(Box::new(FileStream {
            slot: RenderSlot::default(),
            tracks: vec![track],
            pending: Some(audio.samples),
            paced: self.paced,
            running: Arc::new(AtomicBool::new(true)),
            feeder: None,
            events_tx: Some(events_tx),
            events_rx: Some(events_rx),
        }))
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

struct FileStream {
    slot: RenderSlot,
    tracks: Vec<TrackInfo>,
    pending: Option<Vec<f32>>,
    paced: bool,
    running: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
    events_tx: Option<mpsc::Sender<TrackEvent>>,
    events_rx: Option<mpsc::Receiver<TrackEvent>>,
}

impl FileStream {
    fn spawn_feeder(&mut self, samples: Vec<f32>) {
        let slot = self.slot.clone();
        let running = self.running.clone();
        let paced = self.paced;
        let sample_rate = self.tracks[0].sample_rate.max(1);

        let spawned = std::thread::Builder::new()
            .name("mic-capture-file".to_string())
            .spawn(move || {
                let quantum_period =
                    Duration::from_secs_f64(RENDER_QUANTUM as f64 / sample_rate as f64);
                let started = Instant::now();

                for (index, quantum) in samples.chunks(RENDER_QUANTUM).enumerate() {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    if paced {
                        let due = started + quantum_period * index as u32;
                        if let Some(wait) = due.checked_duration_since(Instant::now()) {
                            std::thread::sleep(wait);
                        }
                    }
                    slot.render(quantum);
                }

                debug!("File input exhausted");
            });

        match spawned {
            Ok(handle) => self.feeder = Some(handle),
            Err(e) => error!("Failed to spawn file feeder thread: {}", e),
        }
    }
}

impl CaptureStream for FileStream {
    fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    fn connect(&mut self, node: Box<dyn RenderNode>) {
        self.slot.attach(node);
        if let Some(samples) = self.pending.take() {
            self.spawn_feeder(samples);
        }
    }

    fn disconnect(&mut self) {
        self.slot.detach();
    }

    fn take_track_events(&mut self) -> Option<mpsc::Receiver<TrackEvent>> {
        self.events_rx.take()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(feeder) = self.feeder.take() {
            if feeder.join().is_err() {
                error!("File feeder thread panicked");
            }
        }
        self.events_tx = None;
        self.pending = None;
    }

    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        self.stop();
    }
}
