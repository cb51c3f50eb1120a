//! Streaming feature normalization.
//!
//! `RunningMeanStd` keeps the cumulative mean and variance of cut feature
//! vectors so states can be standardized before they reach a policy.

use crate::checkpoint::NormalizerSnapshot;
use crate::{CutselError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Default epsilon, used both as the initial pseudo-count and as the
/// denominator guard in [`RunningMeanStd::normalize`].
pub const DEFAULT_EPSILON: f64 = 1e-4;

/// Running mean/variance over feature vectors of a fixed dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct RunningMeanStd {
    mean: Array1<f64>,
    var: Array1<f64>,
    count: f64,
    epsilon: f64,
}

impl RunningMeanStd {
    /// Create a normalizer for `dim`-dimensional features.
    pub fn new(dim: usize) -> Self {
        Self::with_epsilon(dim, DEFAULT_EPSILON)
    }

    pub fn with_epsilon(dim: usize, epsilon: f64) -> Self {
        Self {
            mean: Array1::zeros(dim),
            var: Array1::ones(dim),
            count: epsilon,
            epsilon,
        }
    }

    /// Feature dimension fixed at construction.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn var(&self) -> &Array1<f64> {
        &self.var
    }

    pub fn std(&self) -> Array1<f64> {
        self.var.mapv(f64::sqrt)
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Merge a batch of row vectors into the running statistics.
    pub fn update(&mut self, batch: ArrayView2<'_, f32>) -> Result<()> {
        self.check_dim(batch.ncols())?;
        if batch.nrows() == 0 {
            return Ok(());
        }

        let batch = batch.mapv(f64::from);
        let batch_count = batch.nrows() as f64;
        // nrows > 0 so the axis means exist
        let batch_mean = batch
            .mean_axis(Axis(0))
            .ok_or(CutselError::EmptyBatch("normalizer update"))?;
        let batch_var = batch.var_axis(Axis(0), 0.0);

        self.merge(&batch_mean, &batch_var, batch_count);
        Ok(())
    }

    /// Parallel-variance combination of the current aggregate with a batch.
    fn merge(&mut self, batch_mean: &Array1<f64>, batch_var: &Array1<f64>, batch_count: f64) {
        let delta = batch_mean - &self.mean;
        let tot_count = self.count + batch_count;

        let new_mean = &self.mean + &(&delta * (batch_count / tot_count));
        let m_a = &self.var * self.count;
        let m_b = batch_var * batch_count;
        let m_2 = m_a + m_b + delta.mapv(|d| d * d) * (self.count * batch_count / tot_count);

        self.mean = new_mean;
        self.var = m_2 / tot_count;
        self.count = tot_count;
    }

    /// Standardize every row: `(x - mean) / (std + epsilon)`.
    pub fn normalize(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        self.check_dim(x.ncols())?;
        let denom = self.std() + self.epsilon;
        let mut out = x.mapv(f64::from);
        out -= &self.mean;
        out /= &denom;
        Ok(out.mapv(|v| v as f32))
    }

    fn check_dim(&self, actual: usize) -> Result<()> {
        if actual != self.dim() {
            return Err(CutselError::ShapeMismatch {
                expected: vec![self.dim()],
                actual: vec![actual],
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> NormalizerSnapshot {
        NormalizerSnapshot {
            mean: self.mean.to_vec(),
            var: self.var.to_vec(),
            count: self.count,
            epsilon: self.epsilon,
        }
    }

    pub fn from_snapshot(snapshot: &NormalizerSnapshot) -> Result<Self> {
        if snapshot.mean.len() != snapshot.var.len() {
            return Err(CutselError::ShapeMismatch {
                expected: vec![snapshot.mean.len()],
                actual: vec![snapshot.var.len()],
            });
        }
        Ok(Self {
            mean: Array1::from(snapshot.mean.clone()),
            var: Array1::from(snapshot.var.clone()),
            count: snapshot.count,
            epsilon: snapshot.epsilon,
        })
    }
}
