use super::config::SessionConfig;
use super::stats::SessionStats;
use crate::audio::{
    Analyser, AudioBlock, AudioGraph, CaptureStream, SampleBufferWorklet, TrackEvent,
};
use crate::error::CaptureError;
use crate::status::{Controls, Severity, StatusSink};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

#[derive(Default)]
struct Collected {
    active: bool,
    blocks: Vec<AudioBlock>,
    samples: usize,
}

/// Accumulates delivered blocks while the session is active
///
/// The active flag and the buffer share one lock, so a block is either
/// appended before [`BlockCollector::deactivate`] or not at all.
#[derive(Clone, Default)]
pub struct BlockCollector {
    inner: Arc<Mutex<Collected>>,
}

impl BlockCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collected> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn activate(&self) {
        self.lock().active = true;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Append `block` if active. Returns false (and drops it) otherwise.
    pub fn deliver(&self, block: AudioBlock) -> bool {
        let mut collected = self.lock();
        if !collected.active {
            return false;
        }
        collected.samples += block.len();
        collected.blocks.push(block);
        true
    }

    /// Clear the active flag and take everything appended so far
    pub fn deactivate(&self) -> Vec<AudioBlock> {
        let mut collected = self.lock();
        collected.active = false;
        collected.samples = 0;
        std::mem::take(&mut collected.blocks)
    }

    pub fn block_count(&self) -> usize {
        self.lock().blocks.len()
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples
    }
}

/// Resources of one recording attempt
///
/// Owns the input stream, the capture graph, the accumulated blocks and the
/// background tasks. Dropping the session tears all of it down.
pub struct CaptureSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    stream: Box<dyn CaptureStream>,
    graph: AudioGraph,
    collector: BlockCollector,
    delivery_task: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
    status: Arc<dyn StatusSink>,
    torn_down: bool,
}

impl CaptureSession {
    /// Take ownership of an acquired stream and create the graph for it
    pub fn new(
        stream: Box<dyn CaptureStream>,
        config: &SessionConfig,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let requested = config.constraints.sample_rate;
        let sample_rate = stream
            .tracks()
            .first()
            .map_or(requested, |track| track.sample_rate);
        if sample_rate != requested {
            warn!(
                "Track runs at {}Hz instead of {}Hz; samples are not resampled",
                sample_rate, requested
            );
            info!("Recording will be encoded at {}Hz", sample_rate);
        }

        let id = Uuid::new_v4();
        debug!("Creating capture session {}", id);

        Self {
            id,
            started_at: Utc::now(),
            stream,
            graph: AudioGraph::create(sample_rate, config.fft_size),
            collector: BlockCollector::new(),
            delivery_task: None,
            tasks: Vec::new(),
            status,
            torn_down: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    pub fn collector(&self) -> &BlockCollector {
        &self.collector
    }

    /// Wire source -> worklet/analyser and start accumulating blocks
    pub fn begin(&mut self, config: &SessionConfig) -> Result<Analyser, CaptureError> {
        let (port, blocks) = mpsc::channel(config.worklet_channel_capacity.max(1));
        let worklet = SampleBufferWorklet::new(config.block_size, port);
        let analyser = self.graph.connect(self.stream.as_mut(), worklet)?;

        self.collector.activate();
        self.delivery_task = Some(tokio::spawn(deliver_blocks(
            blocks,
            self.collector.clone(),
            config.encoder.silence_threshold,
        )));

        self.started_at = Utc::now();
        Ok(analyser)
    }

    /// Start the periodic signal-level check; it ends itself once inactive
    pub fn spawn_level_check(&mut self, analyser: Analyser, config: &SessionConfig) {
        let task = tokio::spawn(check_levels(
            analyser,
            self.collector.clone(),
            self.status.clone(),
            LevelCheck {
                threshold: config.low_signal_threshold,
                interval: config.level_check_interval,
                warn_interval: config.low_signal_warn_interval,
            },
        ));
        self.tasks.push(task);
    }

    pub fn take_track_events(&mut self) -> Option<mpsc::Receiver<TrackEvent>> {
        self.stream.take_track_events()
    }

    /// Tie a background task to the session's lifetime
    pub fn attach_task(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Disconnect the source and wait for blocks already posted by the worklet
    pub async fn flush(&mut self, timeout: Duration) {
        self.graph.disconnect(self.stream.as_mut());

        if let Some(mut task) = self.delivery_task.take() {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(())) => debug!("All in-flight blocks delivered"),
                Ok(Err(e)) => error!("Block delivery task failed: {}", e),
                Err(_) => {
                    warn!("Timed out waiting for in-flight blocks");
                    task.abort();
                }
            }
        }
    }

    /// Clear the active flag and take the accumulated blocks
    pub fn finish(&mut self) -> Vec<AudioBlock> {
        let blocks = self.collector.deactivate();
        info!(
            "Capture session {} finished with {} blocks",
            self.id,
            blocks.len()
        );
        blocks
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            is_recording: self.collector.is_active(),
            started_at: Some(self.started_at),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            blocks_captured: self.collector.block_count(),
            samples_captured: self.collector.sample_count(),
            sample_rate: self.graph.sample_rate(),
        }
    }

    /// Release every resource and reset the controls. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.collector.deactivate();
        if let Some(task) = self.delivery_task.take() {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        self.stream.stop();
        self.graph.disconnect(self.stream.as_mut());
        self.graph.close();

        self.status.controls(Controls::idle());
        info!("Capture session {} torn down", self.id);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn deliver_blocks(
    mut port: mpsc::Receiver<AudioBlock>,
    collector: BlockCollector,
    silence_threshold: f32,
) {
    while let Some(block) = port.recv().await {
        let peak = block.peak();
        if !collector.deliver(block) {
            debug!("Dropping block delivered after stop");
            continue;
        }
        if peak > silence_threshold {
            debug!("Audio block captured, peak {:.6}", peak);
        } else {
            debug!("Audio level low, peak {:.6}", peak);
        }
    }
}

struct LevelCheck {
    threshold: f32,
    interval: Duration,
    warn_interval: Duration,
}

async fn check_levels(
    mut analyser: Analyser,
    collector: BlockCollector,
    status: Arc<dyn StatusSink>,
    check: LevelCheck,
) {
    let mut ticker = tokio::time::interval(check.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_warning: Option<Instant> = None;

    loop {
        ticker.tick().await;
        if !collector.is_active() {
            debug!("Level check stopped");
            break;
        }

        let average = analyser.average_level();
        trace!("Input level: average {:.2}", average);

        if average < check.threshold {
            let due = last_warning.map_or(true, |at| at.elapsed() >= check.warn_interval);
            if due {
                warn!("Audio input level low: {:.2}", average);
                status.status(
                    Severity::Warn,
                    "Warning: audio input level is low. Make sure the microphone works and is close to the sound source.",
                );
                last_warning = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{RenderNode, RenderSlot, TrackInfo};
    use crate::status::ConsoleStatus;

    struct StubStream {
        slot: RenderSlot,
        tracks: Vec<TrackInfo>,
        stopped: bool,
    }

    impl StubStream {
        fn at_rate(sample_rate: u32) -> Self {
            Self {
                slot: RenderSlot::default(),
                tracks: vec![TrackInfo {
                    label: "stub".to_string(),
                    sample_rate,
                    channels: 1,
                }],
                stopped: false,
            }
        }
    }

    impl CaptureStream for StubStream {
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
            None
        }

        fn stop(&mut self) {
            self.stopped = true;
            self.slot.detach();
        }

        fn is_live(&self) -> bool {
            !self.stopped
        }
    }

    #[tokio::test]
    async fn test_teardown_closes_graph() {
        let config = SessionConfig::default();
        let stream = StubStream::at_rate(44100);
        let slot = stream.slot.clone();
        let mut session =
            CaptureSession::new(Box::new(stream), &config, Arc::new(ConsoleStatus::new()));

        session.begin(&config).unwrap();
        assert!(session.graph.is_connected());
        assert!(slot.is_attached());
        assert!(session.collector().is_active());

        session.teardown();
        assert!(session.graph.is_closed());
        assert!(!slot.is_attached());
        assert!(!session.collector().is_active());
        assert!(session.begin(&config).is_err());

        // Second teardown is a no-op
        session.teardown();
    }

    #[test]
    fn test_graph_follows_track_rate() {
        let config = SessionConfig::default();
        let session = CaptureSession::new(
            Box::new(StubStream::at_rate(48000)),
            &config,
            Arc::new(ConsoleStatus::new()),
        );
        assert_eq!(session.sample_rate(), 48000);
    }

    #[test]
    fn test_no_block_appended_after_deactivate() {
        let collector = BlockCollector::new();
        collector.activate();

        assert!(collector.deliver(AudioBlock::new(vec![0.1; 4])));
        assert!(collector.deliver(AudioBlock::new(vec![0.2; 4])));

        let taken = collector.deactivate();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].samples()[0], 0.1);
        assert_eq!(taken[1].samples()[0], 0.2);

        assert!(!collector.deliver(AudioBlock::new(vec![0.3; 4])));
        assert_eq!(collector.block_count(), 0);
        assert_eq!(collector.sample_count(), 0);
    }

    #[test]
    fn test_inactive_collector_ignores_blocks() {
        let collector = BlockCollector::new();
        assert!(!collector.is_active());
        assert!(!collector.deliver(AudioBlock::new(vec![0.5; 4])));
        assert!(collector.deactivate().is_empty());
    }

    #[test]
    fn test_sample_count_is_sum_of_block_lengths() {
        let collector = BlockCollector::new();
        collector.activate();
        for len in [4096, 4096, 100] {
            collector.deliver(AudioBlock::new(vec![0.0; len]));
        }
        assert_eq!(collector.block_count(), 3);
        assert_eq!(collector.sample_count(), 8292);
    }
}
