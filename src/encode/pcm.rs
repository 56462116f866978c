use crate::audio::AudioBlock;
use crate::error::EncodeError;

/// Peak amplitude below which a recording counts as silent
pub const SILENCE_THRESHOLD: f32 = 0.001;

/// Concatenate blocks in delivery order
pub fn concat_blocks(blocks: &[AudioBlock]) -> Vec<f32> {
    let total: usize = blocks.iter().map(AudioBlock::len).sum();
    let mut merged = Vec::with_capacity(total);
    for block in blocks {
        merged.extend_from_slice(block.samples());
    }
    merged
}

pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |max, s| max.max(s.abs()))
}

/// Scale to 16-bit, clamping out-of-range input (NaN maps to 0)
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

pub fn to_i16_samples(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| to_i16(s)).collect()
}

/// Merge `blocks` and reject empty or silent recordings
pub fn validate_blocks(blocks: &[AudioBlock], silence_threshold: f32) -> Result<Vec<f32>, EncodeError> {
    if blocks.is_empty() {
        return Err(EncodeError::NoAudioData);
    }

    let merged = concat_blocks(blocks);
    let peak = peak_amplitude(&merged);
    if peak < silence_threshold {
        return Err(EncodeError::SilentRecording { peak });
    }

    Ok(merged)
}
