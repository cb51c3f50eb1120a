//! REINFORCE loss helpers.

use std::ops::Range;
#[cfg(feature = "torch")]
use tch::{Kind, Reduction, Tensor};

/// Pointer-policy log-probabilities below this are treated as degenerate.
pub const LOW_LEVEL_LOGPROB_FLOOR: f64 = -4000.0;

/// Cut-percentage policy log-probabilities below this are treated as degenerate.
pub const HIGH_LEVEL_LOGPROB_FLOOR: f64 = -1e5;

/// Split `n` samples into consecutive mini-batches of `batch_size`.
///
/// Yields `ceil(n / batch_size)` ranges, the last one possibly shorter; a
/// single range when `n < batch_size`. `batch_size` must be positive.
pub fn minibatch_ranges(n: usize, batch_size: usize) -> Vec<Range<usize>> {
    debug_assert!(batch_size > 0);
    (0..n.div_ceil(batch_size))
        .map(|i| {
            let start = i * batch_size;
            start..(start + batch_size).min(n)
        })
        .collect()
}

/// Stop-gradient for log-probabilities that underflowed.
///
/// Returns the value to use in the loss and whether it still carries a
/// gradient. A log-probability below `threshold` (or NaN) keeps its value but
/// is detached from the graph, so it contributes nothing to the update.
#[cfg(feature = "torch")]
pub fn mask_degenerate(log_prob: &Tensor, threshold: f64) -> (Tensor, bool) {
    let value = log_prob.double_value(&[]);
    if value >= threshold {
        (log_prob.shallow_clone(), true)
    } else {
        (log_prob.detach(), false)
    }
}

/// `mean(advantage * log_prob)`. Rewards are negated costs, so minimizing
/// this minimizes expected cost.
#[cfg(feature = "torch")]
pub fn reinforce_loss(advantage: &Tensor, log_probs: &Tensor) -> Tensor {
    (advantage * log_probs).mean(Kind::Float)
}

/// Least-squares regression of the value estimates toward the rewards.
#[cfg(feature = "torch")]
pub fn critic_loss(values: &Tensor, rewards: &Tensor) -> Tensor {
    values.mse_loss(rewards, Reduction::Mean)
}

/// Entropy of a probability vector. Zero-probability entries contribute 0.
#[cfg(feature = "torch")]
pub fn softmax_entropy(probs: &Tensor) -> Tensor {
    let probs = probs.squeeze();
    -(&probs * probs.clamp_min(1e-12).log()).sum(Kind::Float)
}
