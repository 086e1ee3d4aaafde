pub mod classifier;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod projector;
pub mod session;
pub mod smoother;
pub mod source;
pub mod types;
pub mod websocket;

pub use classifier::{ExerciseClassifier, StaticClassifier, FALLBACK_LABEL};
pub use detector::{Detection, DetectorConfig, DetectorState, RepDetector};
pub use error::SourceError;
pub use pipeline::{Pipeline, PipelineConfig};
pub use projector::OnlineProjector;
pub use session::{ControlRequest, SessionBroker, SessionConfig, ViewerId, ViewerRegistry};
pub use smoother::EmaSmoother;
pub use source::SampleSource;
pub use types::{ClientMessage, ExerciseLabel, Sample, ServerMessage};
pub use websocket::{handle_websocket, AppState};
