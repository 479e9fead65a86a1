//! Shared processing context: the node graph plus the sink that pulls from it.
//!
//! A context is either backed by a cpal output stream (the stream callback
//! renders the graph) or offline, where the owner calls [`ProcessingContext::render`]
//! (tests, headless runs through a [`RenderPump`]).

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::device::{get_output_device, get_supported_config, AudioConfig};
use super::graph::{Graph, NodeProcessor};
use super::nodes::{NodeHandle, NodeId, NodeKind};
use super::ticker::PeriodicWorker;
use crate::error::{EngineError, Result};

/// Shared state between the context handle, node handles and the audio thread
pub(crate) struct ContextShared {
    graph: Mutex<Graph>,
    sample_rate: u32,
    channels: usize,
    node_limit: Option<usize>,
    frames_rendered: AtomicU64,
    clipping: AtomicBool,
}

impl ContextShared {
    pub(crate) fn connect(&self, from: NodeId, to: NodeId) -> Result<()> {
        self.graph.lock().connect(from, to)
    }

    pub(crate) fn disconnect(&self, from: NodeId) {
        self.graph.lock().disconnect(from);
    }

    pub(crate) fn output_of(&self, id: NodeId) -> Option<NodeId> {
        self.graph.lock().output_of(id)
    }

    pub(crate) fn release(&self, id: NodeId) {
        if !self.graph.lock().remove(id) {
            log::warn!("ProcessingContext: release of unknown node {}", id);
        }
    }

    fn render(&self, data: &mut [f32]) {
        let clipped = self.graph.lock().render(data, self.channels);
        if clipped {
            self.clipping.store(true, Ordering::Relaxed);
        }
        self.frames_rendered
            .fetch_add((data.len() / self.channels.max(1)) as u64, Ordering::Relaxed);
    }
}

/// Options for an offline context
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub sample_rate: u32,
    pub channels: u16,
    /// Ceiling on live nodes; creation beyond it fails
    pub max_nodes: Option<usize>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            max_nodes: None,
        }
    }
}

/// Cheap-to-clone handle to a processing context
#[derive(Clone)]
pub struct ProcessingContext {
    shared: Arc<ContextShared>,
}

impl ProcessingContext {
    fn with_format(sample_rate: u32, channels: usize, max_nodes: Option<usize>) -> Self {
        Self {
            shared: Arc::new(ContextShared {
                graph: Mutex::new(Graph::new()),
                sample_rate,
                channels: channels.max(1),
                node_limit: max_nodes,
                frames_rendered: AtomicU64::new(0),
                clipping: AtomicBool::new(false),
            }),
        }
    }

    /// Create a context that renders only when asked to
    pub fn offline(options: ContextOptions) -> Result<Self> {
        if options.sample_rate == 0 || options.channels == 0 {
            return Err(EngineError::ContextUnavailable(format!(
                "unsupported format: {} Hz, {} channels",
                options.sample_rate, options.channels
            )));
        }
        Ok(Self::with_format(
            options.sample_rate,
            options.channels as usize,
            options.max_nodes,
        ))
    }

    /// Open an output device and create a context rendered by its stream callback
    pub fn open(
        device_name: Option<&str>,
        config: &AudioConfig,
        max_nodes: Option<usize>,
    ) -> Result<(Self, OutputStream)> {
        let device = get_output_device(device_name)?;
        let stream_config = get_supported_config(&device, config)?;

        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;

        log::info!(
            "Opening processing context: {} Hz, {} channels",
            sample_rate,
            channels
        );

        let context = Self::with_format(sample_rate, channels, max_nodes);
        let shared_clone = Arc::clone(&context.shared);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    shared_clone.render(data);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None, // No timeout
            )
            .map_err(|e| {
                EngineError::ContextUnavailable(format!("Failed to build output stream: {}", e))
            })?;

        stream
            .play()
            .map_err(|e| EngineError::ContextUnavailable(format!("Failed to start stream: {}", e)))?;

        Ok((context, OutputStream { _stream: stream }))
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// Render an interleaved block from the graph
    pub fn render(&self, data: &mut [f32]) {
        self.shared.render(data);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Relaxed)
    }

    /// Get and clear the limiter indicator
    pub fn take_clipping(&self) -> bool {
        self.shared.clipping.swap(false, Ordering::Relaxed)
    }

    /// Nodes currently allocated in this context
    pub fn live_node_count(&self) -> usize {
        self.shared.graph.lock().node_count()
    }

    /// Source nodes currently generating signal
    pub fn running_sources(&self) -> usize {
        self.shared.graph.lock().running_sources()
    }

    /// Allocate a node; the returned handle owns it
    pub(crate) fn create_node(
        &self,
        kind: NodeKind,
        build: impl FnOnce(u32) -> NodeProcessor,
    ) -> Result<NodeHandle> {
        let processor = build(self.shared.sample_rate);
        let id = {
            let mut graph = self.shared.graph.lock();
            if let Some(limit) = self.shared.node_limit {
                if graph.node_count() >= limit {
                    return Err(EngineError::NodeCreation {
                        kind,
                        reason: format!("node limit of {} reached", limit),
                    });
                }
            }
            graph.insert(kind, processor)
        };
        Ok(NodeHandle::new(id, kind, Arc::clone(&self.shared)))
    }
}

/// Keeps the device stream alive; dropping it stops rendering
pub struct OutputStream {
    _stream: cpal::Stream,
}

/// Drives an offline context at real-time pace from a background thread
pub struct RenderPump {
    _worker: PeriodicWorker,
}

impl RenderPump {
    pub fn start(context: ProcessingContext, block_frames: usize) -> Result<Self> {
        let block_frames = block_frames.max(1);
        let period = Duration::from_secs_f64(block_frames as f64 / context.sample_rate() as f64);
        let mut block = vec![0.0f32; block_frames * context.channels()];
        let worker = PeriodicWorker::spawn("render-pump", period, true, move || {
            context.render(&mut block);
        })?;
        Ok(Self { _worker: worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::{Generator, SourceVoice};
    use crate::audio::nodes::{SourceControl, WaveformShape};

    fn make_source(context: &ProcessingContext) -> Result<NodeHandle> {
        context.create_node(NodeKind::Source, |sample_rate| {
            NodeProcessor::Source(SourceVoice {
                control: SourceControl::new(440.0),
                generator: Generator::tone(WaveformShape::Sine, 440.0, sample_rate),
            })
        })
    }

    #[test]
    fn test_handle_drop_releases_node() {
        let context = ProcessingContext::offline(ContextOptions::default()).unwrap();
        let node = make_source(&context).unwrap();
        assert_eq!(context.live_node_count(), 1);
        drop(node);
        assert_eq!(context.live_node_count(), 0);
    }

    #[test]
    fn test_node_limit() {
        let context = ProcessingContext::offline(ContextOptions {
            max_nodes: Some(2),
            ..Default::default()
        })
        .unwrap();
        let _a = make_source(&context).unwrap();
        let b = make_source(&context).unwrap();
        let err = make_source(&context).unwrap_err();
        assert!(matches!(err, EngineError::NodeCreation { kind: NodeKind::Source, .. }));
        assert!(err.is_transient());

        drop(b);
        assert!(make_source(&context).is_ok());
    }

    #[test]
    fn test_offline_render_counts_frames() {
        let context = ProcessingContext::offline(ContextOptions::default()).unwrap();
        let mut block = vec![1.0f32; 256];
        context.render(&mut block);
        assert_eq!(context.frames_rendered(), 128);
        // Empty graph renders silence
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_unsupported_format() {
        let result = ProcessingContext::offline(ContextOptions {
            sample_rate: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(EngineError::ContextUnavailable(_))));
    }
}
