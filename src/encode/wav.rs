use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::{AudioFormat, FrameEncoder};
use crate::error::EncodeError;

/// 16-bit PCM WAV built in memory
///
/// The header carries the final length, so the whole file is produced on flush.
pub struct WavFrameEncoder {
    spec: WavSpec,
    samples: Vec<i16>,
}

impl WavFrameEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            spec: WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            samples: Vec::new(),
        }
    }
}

impl FrameEncoder for WavFrameEncoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn encode_frame(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncodeError> {
        self.samples.extend_from_slice(samples);
        Ok(Vec::new())
    }

    fn flush(&mut self) -> Result<Vec<u8>, EncodeError> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, self.spec)
                .map_err(|e| EncodeError::Codec(e.to_string()))?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| EncodeError::Codec(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| EncodeError::Codec(e.to_string()))?;
        }
        self.samples.clear();
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_flush_produces_readable_wav() {
        let mut encoder = WavFrameEncoder::new(44100);
        assert!(encoder.encode_frame(&[1, -2, 3]).unwrap().is_empty());
        assert!(encoder.encode_frame(&[i16::MAX, i16::MIN]).unwrap().is_empty());

        let bytes = encoder.flush().unwrap();
        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.spec().channels, 1);

        let samples: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![1, -2, 3, i16::MAX, i16::MIN]);
    }
}
