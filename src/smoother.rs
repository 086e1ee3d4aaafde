/// Causal exponential moving average.
///
/// `y_t = alpha * x_t + (1 - alpha) * y_{t-1}`, seeded with the first input.
/// Output at step `t` depends only on inputs at steps <= `t`, so the smoother
/// is safe for real-time streaming. Lower alpha means more smoothing and a
/// slower response.
#[derive(Debug, Clone)]
pub struct EmaSmoother {
    alpha: f64,
    value: Option<f64>,
}

impl EmaSmoother {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}
