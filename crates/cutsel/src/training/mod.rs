//! REINFORCE training for cut selection.
//!
//! Provides:
//! - `TrajectoryAggregator` - Flattens rollout results into a training batch
//! - `ReinforceTrainer` - Policy-gradient updates of the pointer policy
//! - `HierarchicalTrainer` - Adds a periodically trained cut-percentage policy
//! - `HighLevelBuffer` - Storage for cut-percentage samples

mod aggregate;
mod baseline;
mod buffer;
mod config;
mod optimizer;
mod reinforce;

#[cfg(feature = "torch")]
mod hierarchy;
#[cfg(feature = "torch")]
mod trainer;

pub use aggregate::{
    check_state_dims, merge_episode_info, per_feature_stats, stack_states, update_and_normalize,
    TrajectoryAggregator, REWARD_NORM_EPS,
};
pub use baseline::EmaBaseline;
#[cfg(feature = "torch")]
pub use baseline::{compute_advantage, Baseline};
pub use buffer::HighLevelBuffer;
pub use config::{
    BaselineType, DecodeType, HierarchyConfig, LrDecayConfig, RewardType, TrainerConfig,
};
pub use optimizer::{OptimizerKind, StepLr};
#[cfg(feature = "torch")]
pub use optimizer::{clip_grad_norm, TorchOptimizer};
pub use reinforce::{minibatch_ranges, HIGH_LEVEL_LOGPROB_FLOOR, LOW_LEVEL_LOGPROB_FLOOR};
#[cfg(feature = "torch")]
pub use reinforce::{critic_loss, mask_degenerate, reinforce_loss, softmax_entropy};

#[cfg(feature = "torch")]
pub use hierarchy::HierarchicalTrainer;
#[cfg(feature = "torch")]
pub use trainer::ReinforceTrainer;
