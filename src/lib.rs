pub mod audio;
pub mod config;
pub mod download;
pub mod encode;
pub mod error;
pub mod inspect;
pub mod session;
pub mod status;

pub use audio::{
    AudioBlock, AudioFile, AudioInput, AudioInputFactory, AudioSource, CaptureConstraints,
    CaptureStream, FileInput, SampleBufferWorklet,
};
pub use config::Config;
pub use download::{DirectoryDownload, Download};
pub use encode::{AudioFormat, EncodedAudioFile, Encoder, EncoderSettings};
pub use error::{CaptureError, EncodeError};
pub use inspect::RecordingInfo;
pub use session::{CaptureSessionManager, SessionConfig, SessionStats, StopOutcome};
pub use status::{ConsoleStatus, Controls, Guidance, Severity, StatusSink};
