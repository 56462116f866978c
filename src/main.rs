use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mic_capture::{
    AudioFile, AudioFormat, AudioInputFactory, AudioSource, CaptureSessionManager, Config,
    ConsoleStatus, DirectoryDownload, RecordingInfo, StopOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mic-capture", version, about = "Record the microphone to MP3")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/mic-capture")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input devices
    Devices,

    /// Record until Ctrl-C (or for a fixed time) and save the file
    Record {
        /// Replay a WAV file instead of using the microphone
        #[arg(long)]
        input: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,

        /// Output container (mp3 or wav)
        #[arg(long)]
        format: Option<AudioFormat>,

        /// Directory for saved recordings
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show codec, rate and duration of a saved recording
    Inspect {
        path: PathBuf,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Devices => list_devices().await,
        Command::Record {
            input,
            seconds,
            format,
            output,
        } => record(cfg, input, seconds, format, output).await,
        Command::Inspect { path, json } => inspect(path, json),
    }
}

async fn list_devices() -> Result<()> {
    let input = AudioInputFactory::create(AudioSource::Microphone);
    let devices = input.input_devices().await?;

    if devices.is_empty() {
        println!("No audio input devices found");
    }
    for device in devices {
        println!("{} ({:?})", device.label, device.kind);
    }
    Ok(())
}

async fn record(
    cfg: Config,
    input: Option<PathBuf>,
    seconds: Option<u64>,
    format: Option<AudioFormat>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut session_config = cfg.session_config();
    if let Some(format) = format {
        session_config.encoder.format = format;
    }

    // A replayed file stops on its own once it has been played through
    let mut limit = seconds.map(Duration::from_secs);
    if let (None, Some(path)) = (limit, input.as_ref()) {
        let audio = AudioFile::open(path)?;
        limit = Some(Duration::from_secs_f64(audio.duration_seconds) + Duration::from_millis(250));
    }

    let source = match input {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };
    let output_dir = output.unwrap_or_else(|| PathBuf::from(&cfg.output.recordings_path));

    let manager = CaptureSessionManager::new(
        AudioInputFactory::create(source),
        session_config,
        Arc::new(ConsoleStatus::new()),
        Arc::new(DirectoryDownload::new(output_dir)),
    );

    if let Err(err) = manager.start().await {
        bail!("Recording did not start: {}", err);
    }
    match limit {
        Some(limit) => info!("Recording for {:.1}s (Ctrl-C to stop early)", limit.as_secs_f64()),
        None => info!("Recording, press Ctrl-C to stop"),
    }

    wait_for_stop(&manager, limit).await;

    let stats = manager.stats().await;
    info!(
        "Captured {} blocks ({} samples)",
        stats.blocks_captured, stats.samples_captured
    );

    match manager.stop().await {
        StopOutcome::Saved(saved) => {
            println!("{}", saved.path.display());
            Ok(())
        }
        StopOutcome::NotRecording => {
            warn!("Recording ended before it was stopped; nothing was saved");
            Ok(())
        }
        StopOutcome::StartPending => bail!("Microphone acquisition did not finish"),
        StopOutcome::Discarded(err) => {
            warn!("Nothing saved: {}", err);
            Ok(())
        }
        StopOutcome::SaveFailed(err) => bail!("Failed to save recording: {}", err),
    }
}

/// Returns on Ctrl-C, when `limit` elapses, or when the session ends by itself
async fn wait_for_stop(manager: &CaptureSessionManager, limit: Option<Duration>) {
    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    let ended = async {
        let mut poll = tokio::time::interval(Duration::from_millis(250));
        loop {
            poll.tick().await;
            if !manager.is_recording().await {
                break;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = deadline => {}
        _ = ended => {}
    }
}

fn inspect(path: PathBuf, json: bool) -> Result<()> {
    let info = RecordingInfo::probe(&path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", info.path);
        println!("  codec:       {}", info.codec);
        println!("  sample rate: {} Hz", info.sample_rate);
        println!("  channels:    {}", info.channels);
        println!("  duration:    {:.2}s ({} frames)", info.duration_secs, info.frames);
    }
    Ok(())
}
