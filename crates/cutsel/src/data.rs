//! Rollout data produced by solver episodes and the flattened training batch.

use crate::{CutselError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named per-episode metrics (solving time, node count, ...).
///
/// Each metric holds a list so results from several episodes concatenate.
pub type EpisodeInfo = BTreeMap<String, Vec<f64>>;

/// Low-level (cut-ranking) samples of one episode.
///
/// `states[i]` is an `n_cuts x D` feature matrix, `actions[i]` the ordered
/// indices of the cuts the pointer policy selected, `sel_cuts_nums[i]` how many
/// cuts were to be selected and `neg_rewards[i]` the negated cost.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LowLevelDataset {
    pub states: Vec<Array2<f32>>,
    pub actions: Vec<Vec<i64>>,
    pub sel_cuts_nums: Vec<usize>,
    pub neg_rewards: Vec<f64>,
}

impl LowLevelDataset {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Append one sample.
    pub fn push(
        &mut self,
        state: Array2<f32>,
        action: Vec<i64>,
        sel_cuts_num: usize,
        neg_reward: f64,
    ) {
        self.states.push(state);
        self.actions.push(action);
        self.sel_cuts_nums.push(sel_cuts_num);
        self.neg_rewards.push(neg_reward);
    }

    /// Check that the parallel lists line up.
    pub fn validate(&self) -> Result<()> {
        let n = self.states.len();
        if self.actions.len() != n || self.sel_cuts_nums.len() != n || self.neg_rewards.len() != n {
            return Err(CutselError::InconsistentBatch(format!(
                "low-level dataset has {} states, {} actions, {} selection counts, {} rewards",
                n,
                self.actions.len(),
                self.sel_cuts_nums.len(),
                self.neg_rewards.len()
            )));
        }
        Ok(())
    }
}

/// High-level (cut-percentage) samples of one episode.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HighLevelDataset {
    pub states: Vec<Array2<f32>>,
    /// Selected fraction of cuts
    pub actions: Vec<f64>,
    pub neg_rewards: Vec<f64>,
}

impl HighLevelDataset {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn push(&mut self, state: Array2<f32>, action: f64, neg_reward: f64) {
        self.states.push(state);
        self.actions.push(action);
        self.neg_rewards.push(neg_reward);
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.states.len();
        if self.actions.len() != n || self.neg_rewards.len() != n {
            return Err(CutselError::InconsistentBatch(format!(
                "high-level dataset has {} states, {} actions, {} rewards",
                n,
                self.actions.len(),
                self.neg_rewards.len()
            )));
        }
        Ok(())
    }
}

/// Everything one environment rollout hands back for training.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub info: EpisodeInfo,
    pub low_level: LowLevelDataset,
    /// Present only for hierarchical rollouts
    pub high_level: Option<HighLevelDataset>,
}

impl EpisodeResult {
    pub fn new(info: EpisodeInfo, low_level: LowLevelDataset) -> Self {
        Self {
            info,
            low_level,
            high_level: None,
        }
    }

    pub fn with_high_level(mut self, high_level: HighLevelDataset) -> Self {
        self.high_level = Some(high_level);
        self
    }
}

/// Batch mean/std used to standardize rewards of one training call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardNormalization {
    pub mean: f64,
    pub std: f64,
}

/// Flattened low-level samples of one training call.
#[derive(Clone, Debug)]
pub struct TrainingBatch {
    /// `N x 1` column of (scaled, optionally normalized) negative rewards
    pub neg_rewards: Array2<f64>,
    /// Feature matrices, normalized when feature normalization is on
    pub states: Vec<Array2<f32>>,
    pub actions: Vec<Vec<i64>>,
    pub sel_cuts_nums: Vec<usize>,
    pub episode_info: EpisodeInfo,
    pub reward_normalization: Option<RewardNormalization>,
}

impl TrainingBatch {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Rewards as a flat slice in sample order.
    pub fn rewards(&self) -> Vec<f64> {
        self.neg_rewards.iter().copied().collect()
    }

    /// Number of cuts (rows) of every state.
    pub fn cut_counts(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.nrows() as f64).collect()
    }
}
