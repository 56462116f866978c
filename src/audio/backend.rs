use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Samples delivered per render callback, regardless of the device buffer size
pub const RENDER_QUANTUM: usize = 128;

/// Kind of a device reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
}

/// A device reported by [`AudioInput::input_devices`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// Constraints requested when opening the microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Requested sample rate in Hz
    pub sample_rate: u32,
    /// Requested channel count (1 = mono)
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Negotiated settings of one audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Device label
    pub label: String,
    /// Actual sample rate in Hz
    pub sample_rate: u32,
    /// Channels delivered to the render node (always downmixed to 1)
    pub channels: u16,
}

/// Track lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    /// The device went away; the track will not produce more audio
    Ended,
    Muted,
    Unmuted,
}

/// A consumer running on the audio thread
///
/// `inputs` holds one slice per channel of the single input.
pub trait RenderNode: Send {
    fn process(&mut self, inputs: &[&[f32]]);
}

/// The node currently connected to a stream's source
///
/// Backends call [`RenderSlot::render`] from their audio thread; the control
/// thread attaches and detaches nodes. Detaching drops the node.
#[derive(Clone, Default)]
pub struct RenderSlot {
    node: Arc<Mutex<Option<Box<dyn RenderNode>>>>,
}

impl RenderSlot {
    pub fn attach(&self, node: Box<dyn RenderNode>) {
        *self.node.lock().unwrap_or_else(PoisonError::into_inner) = Some(node);
    }

    /// Returns true if a node was connected
    pub fn detach(&self) -> bool {
        self.node
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.node
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Feed mono samples to the connected node in render quanta
    pub fn render(&self, samples: &[f32]) {
        let mut guard = self.node.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = guard.as_mut() {
            for quantum in samples.chunks(RENDER_QUANTUM) {
                node.process(&[quantum]);
            }
        }
    }
}

/// A live input stream returned by [`AudioInput::open`]
pub trait CaptureStream: Send {
    /// Audio tracks of the stream (empty if the device produced none)
    fn tracks(&self) -> &[TrackInfo];

    /// Route the source into `node`, replacing any previous node
    fn connect(&mut self, node: Box<dyn RenderNode>);

    /// Detach the connected node; no further samples reach it
    fn disconnect(&mut self);

    /// Track lifecycle events; can be taken once
    fn take_track_events(&mut self) -> Option<mpsc::Receiver<TrackEvent>>;

    /// Stop all tracks and release the device. Idempotent.
    fn stop(&mut self);

    /// Whether the tracks are still live
    fn is_live(&self) -> bool;
}

/// Audio input capability
///
/// Implementations:
/// - `CpalInput`: default host microphone
/// - `FileInput`: replays a WAV file as if it were a microphone
#[async_trait::async_trait]
pub trait AudioInput: Send + Sync {
    /// Enumerate devices known to the host
    async fn input_devices(&self) -> Result<Vec<InputDevice>, CaptureError>;

    /// Acquire a stream honouring `constraints` as far as the device allows
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone of the host
    Microphone,
    /// WAV file replayed in real time
    File(PathBuf),
}

/// Audio input factory
pub struct AudioInputFactory;

impl AudioInputFactory {
    pub fn create(source: AudioSource) -> Arc<dyn AudioInput> {
        match source {
            AudioSource::Microphone => Arc::new(super::cpal_input::CpalInput::new()),
            AudioSource::File(path) => Arc::new(super::file::FileInput::new(path)),
        }
    }
}
