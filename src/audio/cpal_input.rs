// Microphone backend on top of cpal
//
// cpal streams are not Send, so each opened stream lives on its own thread
// which owns the cpal::Stream until stop is requested. The data callback
// downmixes to mono and feeds the connected render node.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, FromSample, PlayStreamError, Sample,
    SampleFormat, SizedSample, StreamConfig, StreamError, SupportedStreamConfig,
    SupportedStreamConfigsError,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{
    AudioInput, CaptureConstraints, CaptureStream, DeviceKind, InputDevice, RenderNode,
    RenderSlot, TrackEvent, TrackInfo,
};
use crate::error::CaptureError;

impl From<BuildStreamError> for CaptureError {
    fn from(err: BuildStreamError) -> Self {
        match err {
            BuildStreamError::DeviceNotAvailable | BuildStreamError::StreamConfigNotSupported => {
                CaptureError::DeviceUnavailable
            }
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

impl From<PlayStreamError> for CaptureError {
    fn from(err: PlayStreamError) -> Self {
        match err {
            PlayStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

impl From<DefaultStreamConfigError> for CaptureError {
    fn from(err: DefaultStreamConfigError) -> Self {
        match err {
            DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
            DefaultStreamConfigError::StreamTypeNotSupported => CaptureError::NoAudioTrack,
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

impl From<SupportedStreamConfigsError> for CaptureError {
    fn from(err: SupportedStreamConfigsError) -> Self {
        match err {
            SupportedStreamConfigsError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

/// Default host microphone
///
/// Echo cancellation, noise suppression and gain control are left to the
/// platform; cpal exposes no switches for them.
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioInput for CpalInput {
    async fn input_devices(&self) -> Result<Vec<InputDevice>, CaptureError> {
        tokio::task::spawn_blocking(|| {
            let host = cpal::default_host();
            let devices = host
                .input_devices()
                .map_err(|e| CaptureError::Unknown(e.to_string()))?
                .filter_map(|d| d.name().ok())
                .map(|name| InputDevice {
                    id: name.clone(),
                    label: name,
                    kind: DeviceKind::AudioInput,
                })
                .collect();
            Ok(devices)
        })
        .await
        .map_err(|e| CaptureError::Unknown(e.to_string()))?
    }

    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let slot = RenderSlot::default();
        let (events_tx, events_rx) = mpsc::channel(8);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let constraints = constraints.clone();
        let thread_slot = slot.clone();
        let thread = std::thread::Builder::new()
            .name("mic-capture-input".to_string())
            .spawn(move || match build_stream(&constraints, thread_slot, events_tx) {
                Ok((stream, track)) => {
                    let _ = ready_tx.send(Ok(track));
                    // Returns once stop is requested or the handle is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|e| CaptureError::Unknown(e.to_string()))?;

        let track = ready_rx.await.map_err(|_| CaptureError::Aborted)??;

        info!(
            "Microphone opened: {} ({}Hz)",
            track.label, track.sample_rate
        );

        Ok(Box::new(CpalStream {
            slot,
            tracks: vec![track],
            events: Some(events_rx),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn build_stream(
    constraints: &CaptureConstraints,
    slot: RenderSlot,
    events: mpsc::Sender<TrackEvent>,
) -> Result<(cpal::Stream, TrackInfo), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::DeviceNotFound)?;
    let label = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = pick_config(&device, constraints)?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let track = TrackInfo {
        label,
        sample_rate: config.sample_rate.0,
        channels: 1,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_typed::<f32>(&device, &config, slot, events)?,
        SampleFormat::I16 => build_typed::<i16>(&device, &config, slot, events)?,
        SampleFormat::U16 => build_typed::<u16>(&device, &config, slot, events)?,
        other => {
            return Err(CaptureError::Unknown(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };

    stream.play()?;

    Ok((stream, track))
}

/// Prefer a config at the requested rate, mono, f32; else the device default
fn pick_config(
    device: &cpal::Device,
    constraints: &CaptureConstraints,
) -> Result<SupportedStreamConfig, CaptureError> {
    let wanted = cpal::SampleRate(constraints.sample_rate);

    let mut candidates: Vec<_> = device
        .supported_input_configs()?
        .filter(|range| range.min_sample_rate() <= wanted && wanted <= range.max_sample_rate())
        .collect();
    candidates.sort_by_key(|range| {
        (
            range.channels() != constraints.channels,
            range.sample_format() != SampleFormat::F32,
        )
    });

    if let Some(range) = candidates.into_iter().next() {
        return Ok(range.with_sample_rate(wanted));
    }

    let fallback = device.default_input_config()?;
    warn!(
        "Device does not support {}Hz, using {}Hz",
        constraints.sample_rate,
        fallback.sample_rate().0
    );
    Ok(fallback)
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    slot: RenderSlot,
    events: mpsc::Sender<TrackEvent>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let mut mono: Vec<f32> = Vec::new();

    let data_fn = move |data: &[T], _: &cpal::InputCallbackInfo| {
        mono.clear();
        mono.extend(data.chunks(channels).map(|frame| {
            frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
        }));
        slot.render(&mono);
    };

    let err_fn = move |err: StreamError| match err {
        StreamError::DeviceNotAvailable => {
            warn!("Input device is no longer available");
            let _ = events.try_send(TrackEvent::Ended);
        }
        other => error!("Audio stream error: {}", other),
    };

    Ok(device.build_input_stream(config, data_fn, err_fn, None)?)
}

struct CpalStream {
    slot: RenderSlot,
    tracks: Vec<TrackInfo>,
    events: Option<mpsc::Receiver<TrackEvent>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureStream for CpalStream {
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
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Microphone thread panicked");
            }
        }
        self.slot.detach();
    }

    fn is_live(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop();
    }
}
