use crate::detector::{Detection, DetectorConfig, RepDetector};
use crate::projector::OnlineProjector;
use crate::smoother::EmaSmoother;
use crate::types::Sample;

/// Tunables for the full per-sample transform.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    /// Samples before the projector switches from magnitude to PCA output.
    pub pca_warmup: usize,
    /// EMA smoothing factor; lower is smoother.
    pub smooth_alpha: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            pca_warmup: 30,
            smooth_alpha: 0.15,
        }
    }
}

/// One session's worth of processing state: projector -> smoother -> detector.
///
/// Strictly sequential composition; every stage is causal, so the whole
/// pipeline is. Owned by exactly one consumer loop and never shared.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    projector: OnlineProjector,
    smoother: EmaSmoother,
    detector: RepDetector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let projector = OnlineProjector::new(config.pca_warmup);
        let smoother = EmaSmoother::new(config.smooth_alpha);
        let detector = RepDetector::new(config.detector.clone());
        Self {
            config,
            projector,
            smoother,
            detector,
        }
    }

    /// Run one raw sample through all three stages.
    pub fn process(&mut self, sample: Sample, index: u64) -> Detection {
        let projected = self.projector.update(sample.to_vector());
        let smoothed = self.smoother.update(projected);
        self.detector.process(smoothed, index)
    }

    pub fn rep_count(&self) -> u64 {
        self.detector.rep_count()
    }

    pub fn explained_variance_ratio(&self) -> f64 {
        self.projector.explained_variance_ratio()
    }

    /// Start a brand-new session: warm-up, baseline window and counts are all
    /// discarded together. There is no partial reset.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}
