use crate::types::{ExerciseLabel, Sample};
use thiserror::Error;

/// Label reported when classification fails outright.
pub const FALLBACK_LABEL: ExerciseLabel = ExerciseLabel::BicepCurl;

/// Fewer raw samples than this and no classifier can say anything useful.
pub const MIN_CLASSIFIABLE_SAMPLES: usize = 10;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("not enough samples: got {got}, need at least {need}")]
    NotEnoughSamples { got: usize, need: usize },

    #[error("classification failed: {0}")]
    Model(String),
}

/// Exercise-type classifier contract.
///
/// The session broker hands a short raw-sample buffer to an implementation of
/// this trait and broadcasts whatever label comes back. Implementations are
/// invoked off the consumer loop (via `spawn_blocking`), so they may do
/// arbitrary work. Training and model persistence live outside this crate;
/// the broker only ever calls `classify`.
pub trait ExerciseClassifier: Send + Sync {
    fn classify(&self, samples: &[Sample]) -> Result<ExerciseLabel, ClassifierError>;
}

/// Classifier that always returns a fixed label.
///
/// Stand-in used when no trained model is wired up, and as a test double.
/// Enforces the minimum-sample guard so callers exercise the error path the
/// same way a real model would.
#[derive(Debug, Clone)]
pub struct StaticClassifier {
    label: ExerciseLabel,
}

impl StaticClassifier {
    pub fn new(label: ExerciseLabel) -> Self {
        Self { label }
    }
}

impl ExerciseClassifier for StaticClassifier {
    fn classify(&self, samples: &[Sample]) -> Result<ExerciseLabel, ClassifierError> {
        if samples.len() < MIN_CLASSIFIABLE_SAMPLES {
            return Err(ClassifierError::NotEnoughSamples {
                got: samples.len(),
                need: MIN_CLASSIFIABLE_SAMPLES,
            });
        }
        Ok(self.label)
    }
}
