//! Session broker: the single-threaded consumer loop that owns all pipeline
//! state, plus the registry fanning results out to connected viewers.
//!
//! The only shared mutable structure between the sample source thread and
//! this loop is the bounded handoff queue; viewers communicate through a
//! second control channel handled by the same loop, so session state has
//! exactly one writer.

use crate::classifier::{ExerciseClassifier, FALLBACK_LABEL};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::source::SampleSource;
use crate::types::{Sample, ServerMessage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle identifying one connected viewer.
pub type ViewerId = Uuid;

/// Session-level tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub pipeline: PipelineConfig,
    /// Raw samples collected before the classifier is invoked.
    pub auto_detect_samples: usize,
    /// Status heartbeat every this many samples.
    pub status_interval: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            auto_detect_samples: 200,
            status_interval: 50,
        }
    }
}

/// Requests routed from viewer connections into the consumer loop.
#[derive(Debug)]
pub enum ControlRequest {
    /// A viewer joined; start a fresh session and greet it.
    Connected { viewer: ViewerId },
    /// Explicit session restart.
    Reset { viewer: ViewerId },
    /// Begin collecting samples for exercise classification.
    StartAutoDetect { viewer: ViewerId },
}

/// In-memory registry of connected viewers.
///
/// Broadcast is best effort per viewer: a failed send removes only that
/// viewer and never affects the others or the consumer loop.
#[derive(Clone, Default)]
pub struct ViewerRegistry {
    viewers: Arc<RwLock<HashMap<ViewerId, mpsc::UnboundedSender<ServerMessage>>>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer; returns its handle and the outbound message stream.
    pub fn register(&self) -> (ViewerId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.viewers.write().insert(id, tx);
        (id, rx)
    }

    pub fn remove(&self, id: &ViewerId) {
        self.viewers.write().remove(id);
    }

    /// Send to one viewer; a failure drops that viewer from the set.
    pub fn send_to(&self, id: &ViewerId, message: ServerMessage) -> bool {
        let delivered = match self.viewers.read().get(id) {
            Some(tx) => tx.send(message).is_ok(),
            None => return false,
        };
        if !delivered {
            warn!("dropping unreachable viewer {}", id);
            self.remove(id);
        }
        delivered
    }

    /// Send to every viewer, pruning any that have gone away.
    pub fn broadcast(&self, message: &ServerMessage) {
        let mut dead = Vec::new();
        {
            let viewers = self.viewers.read();
            for (id, tx) in viewers.iter() {
                if tx.send(message.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut viewers = self.viewers.write();
            for id in &dead {
                viewers.remove(id);
            }
            warn!("pruned {} unreachable viewer(s)", dead.len());
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.read().len()
    }
}

/// Owns the consumer loop driving one session at a time.
pub struct SessionBroker {
    registry: ViewerRegistry,
    classifier: Arc<dyn ExerciseClassifier>,
    config: SessionConfig,
}

impl SessionBroker {
    pub fn new(classifier: Arc<dyn ExerciseClassifier>, config: SessionConfig) -> Self {
        Self {
            registry: ViewerRegistry::new(),
            classifier,
            config,
        }
    }

    pub fn registry(&self) -> ViewerRegistry {
        self.registry.clone()
    }

    /// Spawn the sample source on its own thread and drive the consumer loop
    /// over the bounded handoff queue. Raising `shutdown` makes the source
    /// exit at its next read opportunity; its thread detaches and the loop
    /// keeps serving viewers until the control channel closes.
    pub async fn start(
        self,
        source: SampleSource,
        control: mpsc::Receiver<ControlRequest>,
        queue_capacity: usize,
        shutdown: Arc<AtomicBool>,
    ) {
        let (sample_tx, sample_rx) = mpsc::channel(queue_capacity);
        let _source_thread = source.spawn(sample_tx, shutdown);
        self.run(sample_rx, control).await;
    }

    /// Consumer loop: pulls samples and control requests until both the
    /// sample queue and the control channel close. All session state lives in
    /// this function's locals; nothing else mutates it.
    pub async fn run(
        self,
        mut samples: mpsc::Receiver<Sample>,
        mut control: mpsc::Receiver<ControlRequest>,
    ) {
        let mut pipeline = Pipeline::new(self.config.pipeline.clone());
        let mut sample_idx: u64 = 0;
        let mut capture: Option<Vec<Sample>> = None;
        let mut samples_open = true;

        info!("session broker started");
        loop {
            tokio::select! {
                request = control.recv() => match request {
                    Some(request) => {
                        self.handle_control(request, &mut pipeline, &mut sample_idx, &mut capture)
                    }
                    None => {
                        info!("control channel closed, stopping session broker");
                        break;
                    }
                },
                sample = samples.recv(), if samples_open => match sample {
                    Some(sample) => {
                        self.handle_sample(sample, &mut pipeline, &mut sample_idx, &mut capture)
                    }
                    None => {
                        // The source is gone, but connected viewers keep their
                        // session and can still issue control requests.
                        warn!("sample source closed, continuing without samples");
                        samples_open = false;
                    }
                },
            }
        }
    }

    fn handle_control(
        &self,
        request: ControlRequest,
        pipeline: &mut Pipeline,
        sample_idx: &mut u64,
        capture: &mut Option<Vec<Sample>>,
    ) {
        match request {
            ControlRequest::Connected { viewer } => {
                info!(
                    "viewer {} connected ({} total), starting fresh session",
                    viewer,
                    self.registry.viewer_count()
                );
                pipeline.reset();
                *sample_idx = 0;
                *capture = None;
                self.registry.send_to(&viewer, ServerMessage::Connected);
            }
            ControlRequest::Reset { viewer } => {
                info!("session reset requested by viewer {}", viewer);
                pipeline.reset();
                *sample_idx = 0;
                *capture = None;
                self.registry.send_to(&viewer, ServerMessage::ResetAck);
            }
            ControlRequest::StartAutoDetect { viewer } => {
                info!(
                    "auto-detect started by viewer {}, collecting {} samples",
                    viewer, self.config.auto_detect_samples
                );
                *capture = Some(Vec::with_capacity(self.config.auto_detect_samples));
                self.registry.send_to(
                    &viewer,
                    ServerMessage::AutoDetectStarted {
                        samples_needed: self.config.auto_detect_samples,
                    },
                );
            }
        }
    }

    fn handle_sample(
        &self,
        sample: Sample,
        pipeline: &mut Pipeline,
        sample_idx: &mut u64,
        capture: &mut Option<Vec<Sample>>,
    ) {
        // Classification collects in parallel with rep counting; reps counted
        // while the buffer fills remain valid.
        if let Some(buffer) = capture.as_mut() {
            buffer.push(sample);
            if buffer.len() >= self.config.auto_detect_samples {
                if let Some(full) = capture.take() {
                    self.spawn_classification(full, pipeline.rep_count());
                }
            }
        }

        let result = pipeline.process(sample, *sample_idx);
        *sample_idx += 1;

        if *sample_idx % 500 == 0 {
            debug!(
                "processed {} samples, rep_count={}",
                sample_idx, result.rep_count
            );
        }

        if result.detected {
            info!(
                "rep {} detected (amplitude {:.2}), broadcasting to {} viewer(s)",
                result.rep_count,
                result.amplitude,
                self.registry.viewer_count()
            );
            self.registry.broadcast(&ServerMessage::Rep {
                rep_count: result.rep_count,
                amplitude: result.amplitude,
            });
        }

        if *sample_idx % self.config.status_interval == 0 {
            self.registry.broadcast(&ServerMessage::Status {
                sample_idx: *sample_idx,
                rep_count: result.rep_count,
            });
        }
    }

    /// Hand a full buffer to the classifier without stalling the consumer
    /// loop; the result is broadcast from its own task.
    fn spawn_classification(&self, buffer: Vec<Sample>, rep_count: u64) {
        let classifier = Arc::clone(&self.classifier);
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let outcome =
                tokio::task::spawn_blocking(move || classifier.classify(&buffer)).await;
            let message = match outcome {
                Ok(Ok(label)) => {
                    info!("auto-detect result: {} (rep_count={})", label, rep_count);
                    ServerMessage::ExerciseDetected {
                        exercise: label,
                        rep_count,
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    warn!("classification failed: {}", e);
                    ServerMessage::ExerciseDetected {
                        exercise: FALLBACK_LABEL,
                        rep_count,
                        error: Some(e.to_string()),
                    }
                }
                Err(e) => {
                    warn!("classification task aborted: {}", e);
                    ServerMessage::ExerciseDetected {
                        exercise: FALLBACK_LABEL,
                        rep_count,
                        error: Some(e.to_string()),
                    }
                }
            };
            registry.broadcast(&message);
        });
    }
}
