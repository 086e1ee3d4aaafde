use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One raw 3-axis accelerometer reading, in sensor units.
///
/// Samples carry no timestamp; their position in the stream is the logical
/// clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub ax: i32,
    pub ay: i32,
    pub az: i32,
}

impl Sample {
    pub fn new(ax: i32, ay: i32, az: i32) -> Self {
        Self { ax, ay, az }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.ax as f64, self.ay as f64, self.az as f64)
    }

    /// Parse one line of sensor output: three whitespace-separated integers.
    /// Anything else (debug output, partial lines) yields `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let ax = parts.next()?.parse().ok()?;
        let ay = parts.next()?.parse().ok()?;
        let az = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { ax, ay, az })
    }
}

/// Exercise labels the classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseLabel {
    BicepCurl,
    ShoulderPress,
}

impl std::fmt::Display for ExerciseLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExerciseLabel::BicepCurl => write!(f, "bicep_curl"),
            ExerciseLabel::ShoulderPress => write!(f, "shoulder_press"),
        }
    }
}

/// Messages sent from the server to connected viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect; the session has been reset for this viewer.
    Connected,

    /// A repetition was counted.
    Rep { rep_count: u64, amplitude: f64 },

    /// Periodic heartbeat at a fixed sample-count interval.
    Status { sample_idx: u64, rep_count: u64 },

    /// Result of an auto-detect classification run.
    ExerciseDetected {
        exercise: ExerciseLabel,
        rep_count: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Reply to a reset request.
    ResetAck,

    /// Reply to a start_auto_detect request.
    AutoDetectStarted { samples_needed: usize },
}

/// Requests viewers can send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Discard the current session and start fresh.
    Reset,

    /// Begin collecting samples for exercise classification.
    StartAutoDetect,
}
