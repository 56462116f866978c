pub mod analyser;
pub mod backend;
pub mod cpal_input;
pub mod file;
pub mod graph;
pub mod worklet;

pub use analyser::{Analyser, AnalyserNode, DEFAULT_FFT_SIZE};
pub use backend::{
    AudioInput, AudioInputFactory, AudioSource, CaptureConstraints, CaptureStream, DeviceKind,
    InputDevice, RenderNode, RenderSlot, TrackEvent, TrackInfo, RENDER_QUANTUM,
};
pub use cpal_input::CpalInput;
pub use file::{AudioFile, FileInput};
pub use graph::AudioGraph;
pub use worklet::{AudioBlock, SampleBufferWorklet, BLOCK_SIZE};
