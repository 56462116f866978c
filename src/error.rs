use thiserror::Error;

/// Failures while acquiring the microphone and building the capture graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("no microphone device was found")]
    DeviceNotFound,

    #[error("the input stream contains no audio track")]
    NoAudioTrack,

    #[error("microphone permission was denied")]
    PermissionDenied,

    #[error("the microphone is busy or cannot be read")]
    DeviceUnavailable,

    #[error("microphone acquisition was aborted")]
    Aborted,

    #[error("audio capture requires a secure context")]
    InsecureContext,

    #[error("a recording is already in progress")]
    Busy,

    #[error("recording is currently unavailable")]
    RecordingUnavailable,

    #[error("{0}")]
    Unknown(String),
}

impl CaptureError {
    /// Text shown to the user after a failed start
    pub fn remediation(&self) -> String {
        match self {
            CaptureError::PermissionDenied => {
                "Microphone permission was denied. Check the system microphone privacy settings."
                    .to_string()
            }
            CaptureError::DeviceNotFound => {
                "No microphone device was found. Check the device connection.".to_string()
            }
            CaptureError::NoAudioTrack => {
                "The microphone stream contains no audio track.".to_string()
            }
            CaptureError::DeviceUnavailable => {
                "Cannot access the microphone, it may be in use by another application. \
                 Close other applications using the microphone and try again."
                    .to_string()
            }
            CaptureError::Aborted => "Microphone acquisition was aborted. Please try again.".to_string(),
            CaptureError::InsecureContext => {
                "Security error: audio capture is only allowed from a secure context.".to_string()
            }
            CaptureError::Busy => "A recording is already in progress.".to_string(),
            CaptureError::RecordingUnavailable => {
                "Recording is currently unavailable (no microphone detected?).".to_string()
            }
            CaptureError::Unknown(message) if message.is_empty() => "Unknown error".to_string(),
            CaptureError::Unknown(message) => message.clone(),
        }
    }
}

/// Failures while turning captured blocks into a file
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("no audio data was captured")]
    NoAudioData,

    #[error("recording is silent (peak amplitude {peak:.6})")]
    SilentRecording { peak: f32 },

    #[error("encoder failure: {0}")]
    Codec(String),
}

impl EncodeError {
    /// Soft failures discard the recording with a warning instead of an error
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            EncodeError::NoAudioData | EncodeError::SilentRecording { .. }
        )
    }
}
