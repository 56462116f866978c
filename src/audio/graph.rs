use tracing::{debug, info};

use super::analyser::{Analyser, AnalyserNode};
use super::backend::{CaptureStream, RenderNode};
use super::worklet::SampleBufferWorklet;
use crate::error::CaptureError;

/// Source fan-out: worklet and analyser in parallel
struct SourceFanOut {
    worklet: SampleBufferWorklet,
    analyser: AnalyserNode,
}

impl RenderNode for SourceFanOut {
    fn process(&mut self, inputs: &[&[f32]]) {
        self.worklet.process(inputs);
        self.analyser.process(inputs);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphState {
    Open,
    Connected,
    Closed,
}

/// Audio processing context running at a fixed sample rate
///
/// Topology: source → worklet, source → analyser.
pub struct AudioGraph {
    sample_rate: u32,
    fft_size: usize,
    state: GraphState,
}

impl AudioGraph {
    pub fn create(sample_rate: u32, fft_size: usize) -> Self {
        debug!("Audio graph created at {}Hz (fft {})", sample_rate, fft_size);
        Self {
            sample_rate,
            fft_size,
            state: GraphState::Open,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_connected(&self) -> bool {
        self.state == GraphState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state == GraphState::Closed
    }

    /// Wire the stream's source into `worklet` and a new analyser
    ///
    /// Returns the control-side analyser used by the level check.
    pub fn connect(
        &mut self,
        stream: &mut dyn CaptureStream,
        worklet: SampleBufferWorklet,
    ) -> Result<Analyser, CaptureError> {
        if self.state == GraphState::Closed {
            return Err(CaptureError::Unknown("audio graph is closed".to_string()));
        }

        let (node, analyser) = Analyser::new(self.fft_size);
        stream.connect(Box::new(SourceFanOut {
            worklet,
            analyser: node,
        }));
        self.state = GraphState::Connected;

        info!("Audio graph connected: source -> worklet, source -> analyser");
        Ok(analyser)
    }

    /// Detach all nodes from the source. Dropping the worklet closes its port.
    pub fn disconnect(&mut self, stream: &mut dyn CaptureStream) {
        if self.state == GraphState::Connected {
            stream.disconnect();
            self.state = GraphState::Open;
            debug!("Audio graph disconnected");
        }
    }

    pub fn close(&mut self) {
        if self.state != GraphState::Closed {
            self.state = GraphState::Closed;
            debug!("Audio graph closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{RenderSlot, TrackEvent, TrackInfo};
    use tokio::sync::mpsc;

    struct SlotStream {
        slot: RenderSlot,
        tracks: Vec<TrackInfo>,
    }

    impl SlotStream {
        fn new() -> Self {
            Self {
                slot: RenderSlot::default(),
                tracks: Vec::new(),
            }
        }
    }

    impl CaptureStream for SlotStream {
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
            self.slot.detach();
        }

        fn is_live(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_connect_feeds_worklet() {
        let mut graph = AudioGraph::create(44100, 256);
        let mut stream = SlotStream::new();
        let (tx, mut rx) = mpsc::channel(4);

        graph
            .connect(&mut stream, SampleBufferWorklet::new(256, tx))
            .unwrap();
        assert!(graph.is_connected());
        assert!(stream.slot.is_attached());

        stream.slot.render(&[0.5; 256]);
        assert_eq!(rx.try_recv().unwrap().len(), 256);
    }

    #[test]
    fn test_disconnect_drops_worklet_port() {
        let mut graph = AudioGraph::create(44100, 256);
        let mut stream = SlotStream::new();
        let (tx, mut rx) = mpsc::channel(4);

        graph
            .connect(&mut stream, SampleBufferWorklet::new(256, tx))
            .unwrap();
        graph.disconnect(&mut stream);

        assert!(!graph.is_connected());
        assert!(!graph.is_closed());
        assert!(!stream.slot.is_attached());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_closed_graph_refuses_connect() {
        let mut graph = AudioGraph::create(44100, 256);
        let mut stream = SlotStream::new();
        graph.close();
        graph.close();
        assert!(graph.is_closed());

        let (tx, _rx) = mpsc::channel(4);
        let result = graph.connect(&mut stream, SampleBufferWorklet::new(256, tx));
        assert!(matches!(result, Err(CaptureError::Unknown(_))));
        assert!(!stream.slot.is_attached());
    }
}
