// Integration tests for WAV file decoding and file-backed capture

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{eventually, MemoryDownload, RecordingStatus};
use hound::{SampleFormat, WavSpec, WavWriter};
use mic_capture::audio::CaptureConstraints;
use mic_capture::{
    AudioFile, AudioFormat, AudioInput, CaptureError, CaptureSessionManager, FileInput,
    SessionConfig, StopOutcome,
};
use tempfile::TempDir;

fn write_mono_wav(path: &Path, sample_rate: u32, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample((s * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_open_mono_wav() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("mono.wav");
    write_mono_wav(&path, 44100, &vec![0.25; 44100])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 44100);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert!((audio.samples[0] - 0.25).abs() < 1e-3);
    Ok(())
}

#[test]
fn test_stereo_is_downmixed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("stereo.wav");

    let spec = WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for _ in 0..4800 {
        writer.write_sample(0.6f32)?;
        writer.write_sample(0.2f32)?;
    }
    writer.finalize()?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.samples.len(), 4800);
    assert!((audio.samples[100] - 0.4).abs() < 1e-6);
    assert!((audio.duration_seconds - 0.1).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_open_missing_file_fails() {
    assert!(AudioFile::open("/nonexistent/file.wav").is_err());
}

#[tokio::test]
async fn test_missing_file_has_no_devices() -> Result<()> {
    let input = FileInput::new("/nonexistent/file.wav");

    assert!(input.input_devices().await?.is_empty());
    let err = input
        .open(&CaptureConstraints::default())
        .await
        .err()
        .expect("open should fail");
    assert_eq!(err, CaptureError::DeviceNotFound);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_file_is_unavailable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("broken.wav");
    std::fs::write(&path, b"not a wav file")?;

    let input = FileInput::new(&path);
    assert_eq!(input.input_devices().await?.len(), 1);

    let err = input
        .open(&CaptureConstraints::default())
        .await
        .err()
        .expect("open should fail");
    assert_eq!(err, CaptureError::DeviceUnavailable);
    Ok(())
}

#[tokio::test]
async fn test_file_stream_reports_track() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("track.wav");
    write_mono_wav(&path, 44100, &vec![0.1; 1000])?;

    let input = FileInput::unpaced(&path);
    let mut stream = input.open(&CaptureConstraints::default()).await?;

    assert_eq!(stream.tracks().len(), 1);
    assert_eq!(stream.tracks()[0].label, "track.wav");
    assert_eq!(stream.tracks()[0].sample_rate, 44100);
    assert!(stream.is_live());
    assert!(stream.take_track_events().is_some());
    assert!(stream.take_track_events().is_none());

    stream.stop();
    assert!(!stream.is_live());
    Ok(())
}

#[tokio::test]
async fn test_record_from_file_end_to_end() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("speech.wav");
    let samples: Vec<f32> = (0..3 * 4096 + 50)
        .map(|i| (i as f32 * 0.05).sin() * 0.5)
        .collect();
    write_mono_wav(&path, 44100, &samples)?;

    let mut config = SessionConfig::default();
    config.encoder.format = AudioFormat::Wav;

    let status = Arc::new(RecordingStatus::default());
    let download = Arc::new(MemoryDownload::default());
    let manager = CaptureSessionManager::new(
        Arc::new(FileInput::unpaced(&path)),
        config,
        status,
        download.clone(),
    );

    manager.start().await?;

    let watched = manager.clone();
    let captured = eventually(Duration::from_secs(5), || {
        let manager = watched.clone();
        async move { manager.stats().await.blocks_captured == 3 }
    })
    .await;
    assert!(captured);

    let saved = match manager.stop().await {
        StopOutcome::Saved(saved) => saved,
        other => panic!("expected a saved recording, got {:?}", other),
    };
    assert_eq!(saved.file.sample_count, 3 * 4096);
    assert_eq!(saved.file.format, AudioFormat::Wav);
    assert!((saved.file.duration_secs() - 3.0 * 4096.0 / 44100.0).abs() < 1e-9);
    assert_eq!(download.files().len(), 1);
    Ok(())
}
