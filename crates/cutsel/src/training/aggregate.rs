//! Flattening of parallel rollout results into one training batch.

use super::config::TrainerConfig;
use crate::data::{EpisodeInfo, EpisodeResult, RewardNormalization, TrainingBatch};
use crate::log::{create_stats, MetricLogger, Stats};
use crate::normalizer::RunningMeanStd;
use crate::{CutselError, Result};
use ndarray::{concatenate, Array2, ArrayView2, Axis};

/// Added to the batch std when standardizing rewards.
pub const REWARD_NORM_EPS: f64 = 1e-3;

/// Merges per-episode results into a [`TrainingBatch`].
#[derive(Clone, Debug)]
pub struct TrajectoryAggregator {
    reward_scale: f64,
    normalize_reward: bool,
    state_dim: Option<usize>,
}

impl TrajectoryAggregator {
    pub fn new(reward_scale: f64, normalize_reward: bool) -> Self {
        Self {
            reward_scale,
            normalize_reward,
            state_dim: None,
        }
    }

    /// Require every state to have `dim` features.
    ///
    /// Without it, states only have to agree with each other.
    pub fn with_state_dim(mut self, dim: usize) -> Self {
        self.state_dim = Some(dim);
        self
    }

    pub fn from_config(config: &TrainerConfig) -> Self {
        Self::new(config.reward_scale, config.normalize_reward)
    }

    pub fn reward_scale(&self) -> f64 {
        self.reward_scale
    }

    /// Concatenate `results` in order, scale (and optionally standardize) the
    /// rewards, and normalize the states when a normalizer is given.
    ///
    /// The normalizer is updated with every state of the batch before any
    /// state is normalized.
    pub fn aggregate(
        &self,
        results: &[EpisodeResult],
        normalizer: Option<&mut RunningMeanStd>,
        logger: &dyn MetricLogger,
        step: u64,
    ) -> Result<TrainingBatch> {
        let total: usize = results.iter().map(|r| r.low_level.len()).sum();
        if total == 0 {
            return Err(CutselError::EmptyBatch("no low-level samples to train on"));
        }

        let mut states = Vec::with_capacity(total);
        let mut actions = Vec::with_capacity(total);
        let mut sel_cuts_nums = Vec::with_capacity(total);
        let mut raw_rewards = Vec::with_capacity(total);
        for result in results {
            let data = &result.low_level;
            data.validate()?;
            states.extend(data.states.iter().cloned());
            actions.extend(data.actions.iter().cloned());
            sel_cuts_nums.extend(data.sel_cuts_nums.iter().copied());
            raw_rewards.extend(data.neg_rewards.iter().copied());
        }
        let dim = self
            .state_dim
            .or_else(|| states.first().map(|s| s.ncols()))
            .unwrap_or(0);
        check_state_dims(&states, dim)?;
        tracing::debug!(samples = total, episodes = results.len(), "aggregated rollouts");

        let (neg_rewards, reward_normalization) =
            self.process_rewards(&raw_rewards, logger, step)?;

        let states = match normalizer {
            Some(normalizer) => {
                update_and_normalize(normalizer, &states, Some(logger), step)?
            }
            None => states,
        };

        Ok(TrainingBatch {
            neg_rewards,
            states,
            actions,
            sel_cuts_nums,
            episode_info: merge_episode_info(results),
            reward_normalization,
        })
    }

    /// Scale rewards into an `N x 1` column and standardize when enabled.
    ///
    /// The un-normalized distribution is recorded before standardizing.
    pub fn process_rewards(
        &self,
        raw: &[f64],
        logger: &dyn MetricLogger,
        step: u64,
    ) -> Result<(Array2<f64>, Option<RewardNormalization>)> {
        let scaled: Vec<f64> = raw.iter().map(|r| r * self.reward_scale).collect();
        let mut rewards = Array2::from_shape_vec((scaled.len(), 1), scaled)
            .map_err(|e| CutselError::InconsistentBatch(e.to_string()))?;

        if !self.normalize_reward {
            return Ok((rewards, None));
        }

        let flat: Vec<f64> = rewards.iter().copied().collect();
        logger.record_dict(
            &create_stats("training/Nonnormalize Neg Reward", &flat),
            step,
        );

        let mean = rewards.mean().unwrap_or(0.0);
        let std = rewards.std(0.0);
        rewards.mapv_inplace(|r| (r - mean) / (std + REWARD_NORM_EPS));
        Ok((rewards, Some(RewardNormalization { mean, std })))
    }
}

/// Concatenate episode-info metrics key by key, in result order.
pub fn merge_episode_info(results: &[EpisodeResult]) -> EpisodeInfo {
    let mut merged = EpisodeInfo::new();
    for result in results {
        for (key, values) in &result.info {
            merged
                .entry(key.clone())
                .or_default()
                .extend(values.iter().copied());
        }
    }
    merged
}

/// Fail with `ShapeMismatch` unless every state has `dim` columns.
pub fn check_state_dims(states: &[Array2<f32>], dim: usize) -> Result<()> {
    match states.iter().find(|s| s.ncols() != dim) {
        Some(bad) => Err(CutselError::ShapeMismatch {
            expected: vec![dim],
            actual: vec![bad.ncols()],
        }),
        None => Ok(()),
    }
}

/// Stack states vertically into one `total_cuts x D` matrix.
pub fn stack_states(states: &[Array2<f32>]) -> Result<Array2<f32>> {
    let dim = states.first().map(|s| s.ncols()).unwrap_or(0);
    check_state_dims(states, dim)?;
    let views: Vec<ArrayView2<'_, f32>> = states.iter().map(|s| s.view()).collect();
    concatenate(Axis(0), &views).map_err(|_| CutselError::ShapeMismatch {
        expected: vec![dim],
        actual: vec![],
    })
}

/// Per-column summary statistics, named by the 1-based feature index.
pub fn per_feature_stats(stacked: ArrayView2<'_, f32>, name: impl Fn(usize) -> String) -> Stats {
    let mut stats = Stats::new();
    for (i, column) in stacked.axis_iter(Axis(1)).enumerate() {
        let values: Vec<f64> = column.iter().map(|v| f64::from(*v)).collect();
        stats.extend(create_stats(&name(i + 1), &values));
    }
    stats
}

/// Update `normalizer` with all `states`, then normalize each of them.
///
/// When a logger is given, the raw per-feature distributions are recorded.
pub fn update_and_normalize(
    normalizer: &mut RunningMeanStd,
    states: &[Array2<f32>],
    logger: Option<&dyn MetricLogger>,
    step: u64,
) -> Result<Vec<Array2<f32>>> {
    if states.is_empty() {
        return Ok(Vec::new());
    }
    tracing::info!("normalizing data");
    let stacked = stack_states(states)?;
    normalizer.update(stacked.view())?;

    if let Some(logger) = logger {
        let stats = per_feature_stats(stacked.view(), |i| {
            format!("training/cut {i} th non-normalize feature")
        });
        logger.record_dict(&stats, step);
    }

    states
        .iter()
        .map(|s| normalizer.normalize(s.view()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LowLevelDataset;
    use crate::log::{MemoryLogger, NoOpLogger};
    use ndarray::array;

    fn episode(rewards: &[f64], dim: usize, solving_time: f64) -> EpisodeResult {
        let mut data = LowLevelDataset::default();
        for (i, r) in rewards.iter().enumerate() {
            let cuts = i + 2;
            let state =
                Array2::from_shape_fn((cuts, dim), |(c, d)| (c * dim + d) as f32 + *r as f32);
            data.push(state, vec![0, 1], 1, *r);
        }
        let mut info = EpisodeInfo::new();
        info.insert("solving_time".to_string(), vec![solving_time]);
        EpisodeResult::new(info, data)
    }

    #[test]
    fn test_aggregate_keeps_lengths_aligned() {
        let results = vec![episode(&[-1.0, -2.0], 3, 4.0), episode(&[-3.0], 3, 5.0)];
        let aggregator = TrajectoryAggregator::new(1.0, false);

        let batch = aggregator.aggregate(&results, None, &NoOpLogger, 1).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.actions.len(), 3);
        assert_eq!(batch.sel_cuts_nums.len(), 3);
        assert_eq!(batch.neg_rewards.dim(), (3, 1));
        assert_eq!(batch.rewards(), vec![-1.0, -2.0, -3.0]);
        assert_eq!(batch.episode_info["solving_time"], vec![4.0, 5.0]);
        assert!(batch.reward_normalization.is_none());
    }

    #[test]
    fn test_mixed_widths_rejected_without_normalizer() {
        let results = vec![episode(&[-1.0], 4, 0.0), episode(&[-2.0], 2, 0.0)];
        let logger = MemoryLogger::new();

        let err = TrajectoryAggregator::new(1.0, true)
            .aggregate(&results, None, &logger, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            CutselError::ShapeMismatch { ref expected, ref actual }
                if *expected == vec![4] && *actual == vec![2]
        ));
        // nothing recorded before the shape check
        assert_eq!(logger.scalar("training/Nonnormalize Neg Reward Mean"), None);

        let uniform = vec![episode(&[-1.0], 2, 0.0)];
        let err = TrajectoryAggregator::new(1.0, false)
            .with_state_dim(3)
            .aggregate(&uniform, None, &NoOpLogger, 1)
            .unwrap_err();
        assert!(matches!(err, CutselError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_reward_scale_applies_without_normalization() {
        let results = vec![episode(&[-1.0, -2.0], 2, 0.0)];
        let aggregator = TrajectoryAggregator::new(10.0, false);

        let batch = aggregator.aggregate(&results, None, &NoOpLogger, 1).unwrap();
        assert_eq!(batch.rewards(), vec![-10.0, -20.0]);
    }

    #[test]
    fn test_reward_normalization() {
        let rewards = [-10.0, -25.0, -40.0, -55.0, -70.0];
        let results = vec![episode(&rewards, 2, 0.0)];
        let aggregator = TrajectoryAggregator::new(1.0, true);
        let logger = MemoryLogger::new();

        let batch = aggregator.aggregate(&results, None, &logger, 1).unwrap();
        let normalized = batch.rewards();
        let mean = normalized.iter().sum::<f64>() / normalized.len() as f64;
        let std = (normalized.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / normalized.len() as f64)
            .sqrt();

        assert!(mean.abs() < 1e-3);
        assert!((std - 1.0).abs() < 1e-3);
        assert_eq!(batch.reward_normalization.unwrap().mean, -40.0);
        // raw distribution is recorded before standardizing
        assert_eq!(
            logger.scalar("training/Nonnormalize Neg Reward Mean"),
            Some(-40.0)
        );
    }

    #[test]
    fn test_feature_normalization_updates_normalizer() {
        let results = vec![episode(&[-1.0, -2.0], 3, 0.0)];
        let aggregator = TrajectoryAggregator::new(1.0, false);
        let mut normalizer = RunningMeanStd::new(3);
        let logger = MemoryLogger::new();

        let batch = aggregator
            .aggregate(&results, Some(&mut normalizer), &logger, 1)
            .unwrap();

        // 2 + 3 cut rows went into the statistics
        assert!((normalizer.count() - 5.0).abs() < 1e-3);
        assert_eq!(batch.states[0].dim(), (2, 3));
        assert!(logger
            .scalar("training/cut 1 th non-normalize feature Mean")
            .is_some());

        let expected = normalizer.normalize(results[0].low_level.states[1].view()).unwrap();
        assert_eq!(batch.states[1], expected);
    }

    #[test]
    fn test_feature_dimension_mismatch_fails() {
        let results = vec![episode(&[-1.0], 3, 0.0)];
        let aggregator = TrajectoryAggregator::new(1.0, false);
        let mut normalizer = RunningMeanStd::new(4);

        let err = aggregator
            .aggregate(&results, Some(&mut normalizer), &NoOpLogger, 1)
            .unwrap_err();
        assert!(matches!(err, CutselError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_and_inconsistent_batches_fail() {
        let aggregator = TrajectoryAggregator::new(1.0, true);
        assert!(matches!(
            aggregator.aggregate(&[], None, &NoOpLogger, 1),
            Err(CutselError::EmptyBatch(_))
        ));

        let mut broken = episode(&[-1.0, -2.0], 2, 0.0);
        broken.low_level.actions.pop();
        assert!(matches!(
            aggregator.aggregate(&[broken], None, &NoOpLogger, 1),
            Err(CutselError::InconsistentBatch(_))
        ));
    }

    #[test]
    fn test_per_feature_stats() {
        let stacked = array![[1.0f32, 10.0], [3.0, 30.0]];
        let stats = per_feature_stats(stacked.view(), |i| format!("f{i}"));
        assert_eq!(stats["f1 Mean"], 2.0);
        assert_eq!(stats["f2 Max"], 30.0);
    }
}
