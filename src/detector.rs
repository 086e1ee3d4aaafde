use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tunables for the peak/valley repetition detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum peak-to-valley amplitude for a movement to count as a rep.
    pub amplitude_threshold: f64,
    /// Debounce: minimum sample spacing between two counted reps.
    pub min_samples_between_reps: u64,
    /// Capacity of the recent-sample window used for the adaptive baseline.
    pub baseline_window: usize,
    /// Hysteresis margin confirming a peak/valley turn; smaller than the
    /// amplitude threshold so noise cannot trigger spurious transitions.
    pub hysteresis: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 21.0,
            min_samples_between_reps: 20,
            baseline_window: 50,
            hysteresis: 3.0,
        }
    }
}

/// Discrete state of the rep-counting machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    AwaitingPeak,
    AwaitingValley,
}

/// Per-sample detector output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub rep_count: u64,
    pub state: DetectorState,
    pub baseline: f64,
    /// True when this sample completed a counted repetition.
    pub detected: bool,
    /// Peak-to-valley amplitude evaluated at a valley-to-peak transition on
    /// this sample, 0.0 otherwise.
    pub amplitude: f64,
}

/// Peak/valley state machine with an adaptive baseline.
///
/// Tracks the running extremum of the baseline-centered signal in each state.
/// A rep is counted only at the valley-to-peak transition, and only when the
/// amplitude exceeds the threshold and the debounce spacing has elapsed.
#[derive(Debug, Clone)]
pub struct RepDetector {
    config: DetectorConfig,
    state: DetectorState,
    rep_count: u64,
    samples_since_last_rep: u64,
    current_peak: Option<f64>,
    current_valley: f64,
    valley_idx: u64,
    last_rep_idx: Option<u64>,
    recent: VecDeque<f64>,
    recent_sum: f64,
    baseline: f64,
}

impl RepDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::AwaitingPeak,
            rep_count: 0,
            samples_since_last_rep: 0,
            current_peak: None,
            current_valley: 0.0,
            valley_idx: 0,
            last_rep_idx: None,
            recent: VecDeque::new(),
            recent_sum: 0.0,
            baseline: 0.0,
        }
    }

    /// Process one smoothed signal value.
    pub fn process(&mut self, signal: f64, index: u64) -> Detection {
        self.samples_since_last_rep += 1;
        let mut detected = false;
        let mut amplitude = 0.0;

        // Adaptive baseline: mean of the bounded recent window.
        self.recent.push_back(signal);
        self.recent_sum += signal;
        if self.recent.len() > self.config.baseline_window {
            if let Some(evicted) = self.recent.pop_front() {
                self.recent_sum -= evicted;
            }
        }
        self.baseline = self.recent_sum / self.recent.len() as f64;

        let centered = signal - self.baseline;

        match self.state {
            DetectorState::AwaitingPeak => {
                let peak = match self.current_peak {
                    Some(peak) if centered <= peak => peak,
                    _ => {
                        self.current_peak = Some(centered);
                        centered
                    }
                };

                if centered < peak - self.config.hysteresis {
                    self.state = DetectorState::AwaitingValley;
                    self.current_valley = centered;
                    self.valley_idx = index;
                }
            }
            DetectorState::AwaitingValley => {
                if centered < self.current_valley {
                    self.current_valley = centered;
                    self.valley_idx = index;
                }

                if centered > self.current_valley + self.config.hysteresis {
                    amplitude = self.current_peak.unwrap_or(0.0) - self.current_valley;

                    if amplitude > self.config.amplitude_threshold
                        && self.samples_since_last_rep > self.config.min_samples_between_reps
                    {
                        self.rep_count += 1;
                        self.last_rep_idx = Some(self.valley_idx);
                        self.samples_since_last_rep = 0;
                        detected = true;
                    }

                    self.state = DetectorState::AwaitingPeak;
                    self.current_peak = Some(centered);
                }
            }
        }

        Detection {
            rep_count: self.rep_count,
            state: self.state,
            baseline: self.baseline,
            detected,
            amplitude,
        }
    }

    pub fn rep_count(&self) -> u64 {
        self.rep_count
    }

    /// Sample index of the valley that completed the most recent rep.
    pub fn last_rep_idx(&self) -> Option<u64> {
        self.last_rep_idx
    }

    /// Full restart: every field returns to its initial value.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}
