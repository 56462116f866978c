use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, Mode, MonoPcm};

use super::{AudioFormat, FrameEncoder};
use crate::error::EncodeError;

/// LAME recommends this much headroom for the final flush
const FLUSH_BUFFER_SIZE: usize = 7200;

/// Mono MP3 encoder backed by LAME
pub struct Mp3FrameEncoder {
    encoder: mp3lame_encoder::Encoder,
}

impl Mp3FrameEncoder {
    pub fn new(sample_rate: u32, bitrate_kbps: u32) -> Result<Self, EncodeError> {
        let mut builder = Builder::new()
            .ok_or_else(|| EncodeError::Codec("failed to allocate LAME encoder".to_string()))?;

        builder.set_num_channels(1).map_err(codec_error)?;
        builder.set_sample_rate(sample_rate).map_err(codec_error)?;
        builder.set_mode(Mode::Mono).map_err(codec_error)?;
        builder.set_brate(bitrate(bitrate_kbps)?).map_err(codec_error)?;

        let encoder = builder.build().map_err(codec_error)?;
        Ok(Self { encoder })
    }
}

impl FrameEncoder for Mp3FrameEncoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn encode_frame(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(samples.len()));
        self.encoder
            .encode_to_vec(MonoPcm(samples), &mut out)
            .map_err(codec_error)?;
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(FLUSH_BUFFER_SIZE);
        self.encoder
            .flush_to_vec::<FlushNoGap>(&mut out)
            .map_err(codec_error)?;
        Ok(out)
    }
}

fn codec_error(err: impl std::fmt::Debug) -> EncodeError {
    EncodeError::Codec(format!("{:?}", err))
}

fn bitrate(kbps: u32) -> Result<Bitrate, EncodeError> {
    let bitrate = match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(EncodeError::Codec(format!(
                "unsupported MP3 bitrate {} kbps",
                other
            )))
        }
    };
    Ok(bitrate)
}
