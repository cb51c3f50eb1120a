//! Baselines for variance reduction.

#[cfg(feature = "torch")]
use tch::Tensor;

/// Exponential moving average of batch-mean rewards.
///
/// The first update sets the average to the batch mean; later updates blend
/// `ema * beta + (1 - beta) * mean`. Never reset.
#[derive(Clone, Debug, PartialEq)]
pub struct EmaBaseline {
    beta: f64,
    value: Option<f64>,
}

impl EmaBaseline {
    pub fn new(beta: f64) -> Self {
        Self { beta, value: None }
    }

    /// Fold in a new batch mean and return the updated average.
    pub fn update(&mut self, batch_mean: f64) -> f64 {
        let next = match self.value {
            None => batch_mean,
            Some(ema) => ema * self.beta + (1.0 - self.beta) * batch_mean,
        };
        self.value = Some(next);
        next
    }

    /// Current average, or None before the first update.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

/// The reference subtracted from a mini-batch of rewards.
#[cfg(feature = "torch")]
pub enum Baseline<'a> {
    /// `no_baseline`
    None,
    /// `simple`: the EMA scalar
    Scalar(f64),
    /// `net`: per-sample value estimates (detached before use)
    Values(&'a Tensor),
}

/// Advantage `reward - baseline`.
///
/// Value estimates are detached so the policy loss never backpropagates into
/// the critic.
#[cfg(feature = "torch")]
pub fn compute_advantage(rewards: &Tensor, baseline: Baseline<'_>) -> Tensor {
    match baseline {
        Baseline::None => rewards.shallow_clone(),
        Baseline::Scalar(value) => rewards - value,
        Baseline::Values(values) => rewards - values.detach(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_first_update_sets_mean() {
        let mut ema = EmaBaseline::new(0.9);
        assert_eq!(ema.value(), None);

        // rewards [1, 2, 3]
        assert_eq!(ema.update(2.0), 2.0);
        // rewards [4, 5, 6]
        let blended = ema.update(5.0);
        assert!((blended - 2.3).abs() < 1e-12);
        assert_eq!(ema.value(), Some(blended));
    }

    #[test]
    fn test_ema_beta_zero_tracks_latest() {
        let mut ema = EmaBaseline::new(0.0);
        ema.update(10.0);
        assert_eq!(ema.update(-1.0), -1.0);
    }

    #[cfg(feature = "torch")]
    #[test]
    fn test_compute_advantage() {
        let rewards = Tensor::from_slice(&[1.0f32, 2.0, 3.0]).reshape([3, 1]);

        let none = compute_advantage(&rewards, Baseline::None);
        assert!(none.allclose(&rewards, 0.0, 0.0, false));

        let scalar: Vec<f32> =
            Vec::try_from(compute_advantage(&rewards, Baseline::Scalar(2.0)).flatten(0, -1))
                .unwrap();
        assert_eq!(scalar, vec![-1.0, 0.0, 1.0]);

        let values = Tensor::from_slice(&[0.5f32, 0.5, 0.5])
            .reshape([3, 1])
            .set_requires_grad(true);
        let adv = compute_advantage(&rewards, Baseline::Values(&values));
        assert!(!adv.requires_grad());
    }
}
