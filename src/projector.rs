use nalgebra::{Matrix3, Vector3};

/// Incremental principal-component projector for 3-axis samples.
///
/// Maintains the running mean and covariance with Welford's algorithm and
/// projects each centered sample onto the dominant eigenvector of the current
/// covariance estimate. The covariance matrix is only 3x3, so the
/// eigendecomposition has fixed cost regardless of how many samples have been
/// seen.
///
/// During warm-up (the first `warmup` samples) the covariance estimate is not
/// statistically reliable, so the centered-sample magnitude is returned
/// instead.
#[derive(Debug, Clone)]
pub struct OnlineProjector {
    warmup: usize,
    n: usize,
    mean: Vector3<f64>,
    /// Running unnormalized covariance accumulator; divided by `n` it is a
    /// valid covariance estimate at every step.
    cov_acc: Matrix3<f64>,
    /// Previously retained unit eigenvector, used to sign-lock the projection
    /// axis between consecutive samples.
    prev_axis: Option<Vector3<f64>>,
}

impl OnlineProjector {
    pub fn new(warmup: usize) -> Self {
        Self {
            warmup,
            n: 0,
            mean: Vector3::zeros(),
            cov_acc: Matrix3::zeros(),
            prev_axis: None,
        }
    }

    /// Process one sample and return its scalar projection.
    pub fn update(&mut self, x: Vector3<f64>) -> f64 {
        self.n += 1;

        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = x - self.mean;
        self.cov_acc += delta * delta2.transpose();

        if self.n < self.warmup {
            return delta2.norm();
        }

        // Divide by n rather than n-1 for stability at small n.
        let cov = self.cov_acc / self.n as f64;
        let eig = cov.symmetric_eigen();

        let mut top = 0;
        for i in 1..3 {
            if eig.eigenvalues[i] > eig.eigenvalues[top] {
                top = i;
            }
        }
        let mut axis = eig.eigenvectors.column(top).into_owned();

        // Eigenvectors are only defined up to sign; keep the direction
        // consistent with the previous sample so the projection never flips.
        if let Some(prev) = &self.prev_axis {
            if axis.dot(prev) < 0.0 {
                axis = -axis;
            }
        }
        self.prev_axis = Some(axis);

        delta2.dot(&axis)
    }

    /// Fraction of total variance explained by the dominant axis.
    ///
    /// Returns 0.0 before warm-up and when the covariance is degenerate.
    pub fn explained_variance_ratio(&self) -> f64 {
        if self.n < self.warmup {
            return 0.0;
        }
        let cov = self.cov_acc / self.n as f64;
        let eigenvalues = cov.symmetric_eigenvalues();
        let total: f64 = eigenvalues.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let mut max = eigenvalues[0];
        for i in 1..3 {
            if eigenvalues[i] > max {
                max = eigenvalues[i];
            }
        }
        max / total
    }

    /// Currently retained projection axis, if PCA is active.
    pub fn dominant_axis(&self) -> Option<&Vector3<f64>> {
        self.prev_axis.as_ref()
    }

    /// Running mean of all samples seen so far.
    pub fn mean(&self) -> &Vector3<f64> {
        &self.mean
    }

    pub fn sample_count(&self) -> usize {
        self.n
    }
}
