// Sample buffer worklet
//
// Runs on the audio thread. Collects render quanta into fixed-size blocks and
// posts each full block to the control thread over a bounded channel. The
// audio thread never waits on the channel: if the consumer falls behind, the
// block is dropped.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::backend::RenderNode;

/// Samples per block handed to the control thread
pub const BLOCK_SIZE: usize = 4096;

/// One channel of audio covering one worklet emission period
///
/// Immutable once created; clones share the same samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Arc<[f32]>,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Peak absolute amplitude
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |max, s| max.max(s.abs()))
    }
}

impl From<Vec<f32>> for AudioBlock {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

/// Accumulates render quanta into [`AudioBlock`]s
pub struct SampleBufferWorklet {
    capacity: usize,
    buffer: Vec<f32>,
    port: mpsc::Sender<AudioBlock>,
    blocks_dropped: u64,
}

impl SampleBufferWorklet {
    pub fn new(capacity: usize, port: mpsc::Sender<AudioBlock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
            port,
            blocks_dropped: 0,
        }
    }

    /// Samples currently waiting for the block to fill
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn blocks_dropped(&self) -> u64 {
        self.blocks_dropped
    }

    /// Handle one render quantum
    ///
    /// Only the first channel is recorded. Samples that do not fit into the
    /// current block are discarded; the block is emitted once full.
    pub fn process(&mut self, inputs: &[&[f32]]) {
        let Some(channel) = inputs.first() else {
            return;
        };

        let room = self.capacity - self.buffer.len();
        let take = channel.len().min(room);
        self.buffer.extend_from_slice(&channel[..take]);

        if self.buffer.len() >= self.capacity {
            self.emit();
        }
    }

    fn emit(&mut self) {
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        match self.port.try_send(AudioBlock::new(samples)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.blocks_dropped += 1;
                warn!(
                    "Block channel full, dropped block ({} dropped so far)",
                    self.blocks_dropped
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.blocks_dropped += 1;
                debug!("Block channel closed, dropping block");
            }
        }
    }
}

impl RenderNode for SampleBufferWorklet {
    fn process(&mut self, inputs: &[&[f32]]) {
        SampleBufferWorklet::process(self, inputs);
    }
}
