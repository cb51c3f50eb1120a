//! Trainer configuration.

use super::optimizer::OptimizerKind;
use crate::{CutselError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "torch")]
use tch::Device;

/// Generates `FromStr`/`Display` over the snake_case names used in configs.
macro_rules! named_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = CutselError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(CutselError::Config(format!(
                        concat!("unknown ", $what, " '{}' (expected one of: {})"),
                        other,
                        [$($name),+].join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// How an action is drawn from the policy's output distribution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeType {
    Stochastic,
    Greedy,
}

named_enum!(DecodeType, "decode type", {
    Stochastic => "stochastic",
    Greedy => "greedy",
});

/// Solver quantity the episode reward is derived from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    SolvingTime,
    NtotalNodes,
    PrimalDualIntegral,
    LpSolutionValue,
}

named_enum!(RewardType, "reward type", {
    SolvingTime => "solving_time",
    NtotalNodes => "ntotal_nodes",
    PrimalDualIntegral => "primal_dual_integral",
    LpSolutionValue => "lp_solution_value",
});

/// Baseline subtracted from the reward to form the advantage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineType {
    NoBaseline,
    /// Exponential moving average of batch-mean rewards
    Simple,
    /// Learned value network
    Net,
}

named_enum!(BaselineType, "baseline type", {
    NoBaseline => "no_baseline",
    Simple => "simple",
    Net => "net",
});

/// Step learning-rate decay
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LrDecayConfig {
    pub enabled: bool,
    /// Decay every `step` scheduler steps (one step per training call)
    pub step: u64,
    /// Multiplicative factor
    pub rate: f64,
}

impl Default for LrDecayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            step: 5,
            rate: 0.96,
        }
    }
}

/// Configuration for the REINFORCE trainer
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    // Optimization
    /// Gradient-based optimizer used for every network
    pub optimizer: OptimizerKind,
    /// Pointer policy learning rate
    pub actor_lr: f64,
    /// Value network learning rate (`net` baseline)
    pub critic_lr: f64,
    /// Maximum global L2 gradient norm
    pub max_grad_norm: f64,
    /// Mini-batch size
    pub batch_size: usize,
    /// Learning-rate decay
    pub lr_decay: LrDecayConfig,

    // Training schedule
    /// Number of training calls the orchestrator performs
    pub num_epochs: u64,

    // Rewards and baseline
    /// Multiplier applied to every raw reward
    pub reward_scale: f64,
    /// Standardize rewards per training call
    pub normalize_reward: bool,
    /// Reward definition used by the environment
    pub reward_type: RewardType,
    /// Baseline strategy
    pub baseline_type: BaselineType,
    /// EMA decay for the `simple` baseline
    pub critic_beta: f64,

    // Features
    /// Keep running feature statistics and standardize states
    pub normalize: bool,

    // Decoding
    /// Decode strategy while collecting training rollouts
    pub train_decode_type: DecodeType,
    /// Decode strategy during evaluation
    pub evaluate_decode_type: DecodeType,
    /// Fraction of candidate cuts kept by the low-level agent
    pub sel_cuts_percent: f64,

    // Evaluation
    /// Evaluate every N epochs
    pub evaluate_freq: u64,
    /// Rollouts per evaluation
    pub evaluate_samples: usize,

    /// Show a progress bar over mini-batches
    pub show_progress: bool,

    // Device
    /// Device to train on ("cpu" or "cuda")
    #[cfg(feature = "torch")]
    #[serde(skip, default = "default_device")]
    pub device: Device,
}

#[cfg(feature = "torch")]
fn default_device() -> Device {
    Device::Cpu
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::Adam,
            actor_lr: 1e-4,
            critic_lr: 1e-4,
            max_grad_norm: 2.0,
            batch_size: 32,
            lr_decay: LrDecayConfig::default(),

            num_epochs: 100,

            reward_scale: 1.0,
            normalize_reward: true,
            reward_type: RewardType::SolvingTime,
            baseline_type: BaselineType::NoBaseline,
            critic_beta: 0.9,

            normalize: false,

            train_decode_type: DecodeType::Stochastic,
            evaluate_decode_type: DecodeType::Greedy,
            sel_cuts_percent: 0.2,

            evaluate_freq: 1,
            evaluate_samples: 1,

            show_progress: false,

            #[cfg(feature = "torch")]
            device: Device::Cpu,
        }
    }
}

impl TrainerConfig {
    /// Create config for CUDA device
    #[cfg(feature = "torch")]
    pub fn cuda(mut self) -> Self {
        self.device = Device::Cuda(0);
        self
    }

    /// Set actor learning rate
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.actor_lr = lr;
        self
    }

    pub fn with_baseline(mut self, baseline_type: BaselineType) -> Self {
        self.baseline_type = baseline_type;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_lr_decay(mut self, step: u64, rate: f64) -> Self {
        self.lr_decay = LrDecayConfig {
            enabled: true,
            step,
            rate,
        };
        self
    }

    pub fn with_normalization(mut self, features: bool, rewards: bool) -> Self {
        self.normalize = features;
        self.normalize_reward = rewards;
        self
    }

    /// Reject values the trainer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CutselError::Config("batch_size must be positive".into()));
        }
        if !(self.actor_lr > 0.0 && self.critic_lr > 0.0) {
            return Err(CutselError::Config("learning rates must be positive".into()));
        }
        if !(self.max_grad_norm > 0.0) {
            return Err(CutselError::Config("max_grad_norm must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.critic_beta) {
            return Err(CutselError::Config(format!(
                "critic_beta must lie in [0, 1], got {}",
                self.critic_beta
            )));
        }
        if self.lr_decay.enabled && (self.lr_decay.step == 0 || !(self.lr_decay.rate > 0.0)) {
            return Err(CutselError::Config(
                "lr_decay needs a positive step and rate".into(),
            ));
        }
        if !(self.sel_cuts_percent > 0.0 && self.sel_cuts_percent <= 1.0) {
            return Err(CutselError::Config(format!(
                "sel_cuts_percent must lie in (0, 1], got {}",
                self.sel_cuts_percent
            )));
        }
        if self.evaluate_freq == 0 || self.evaluate_samples == 0 {
            return Err(CutselError::Config(
                "evaluate_freq and evaluate_samples must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Extra settings of the hierarchical (two-level) trainer
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Update the cut-percentage policy every N epochs
    pub train_highlevel_policy_freq: u64,
    /// High-level mini-batch size
    pub train_highlevel_batch_size: usize,
    /// High-level policy learning rate
    pub highlevel_actor_lr: f64,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            train_highlevel_policy_freq: 5,
            train_highlevel_batch_size: 32,
            highlevel_actor_lr: 1e-4,
        }
    }
}

impl HierarchyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.train_highlevel_policy_freq == 0 {
            return Err(CutselError::Config(
                "train_highlevel_policy_freq must be positive".into(),
            ));
        }
        if self.train_highlevel_batch_size == 0 {
            return Err(CutselError::Config(
                "train_highlevel_batch_size must be positive".into(),
            ));
        }
        if !(self.highlevel_actor_lr > 0.0) {
            return Err(CutselError::Config(
                "highlevel_actor_lr must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.baseline_type, BaselineType::NoBaseline);
        assert!(HierarchyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_enum_names_round_trip() {
        for name in ["no_baseline", "simple", "net"] {
            assert_eq!(name.parse::<BaselineType>().unwrap().as_str(), name);
        }
        assert_eq!("greedy".parse::<DecodeType>().unwrap(), DecodeType::Greedy);
        assert_eq!(
            "lp_solution_value".parse::<RewardType>().unwrap(),
            RewardType::LpSolutionValue
        );
        assert_eq!(BaselineType::Net.to_string(), "net");
    }

    #[test]
    fn test_unknown_names_fail_fast() {
        let err = "critic".parse::<BaselineType>().unwrap_err();
        assert!(matches!(err, CutselError::Config(_)));
        assert!(err.to_string().contains("no_baseline, simple, net"));
        assert!("beam".parse::<DecodeType>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TrainerConfig::default().with_batch_size(0).validate().is_err());

        let mut config = TrainerConfig::default();
        config.critic_beta = 1.5;
        assert!(config.validate().is_err());

        assert!(TrainerConfig::default()
            .with_lr_decay(0, 0.9)
            .validate()
            .is_err());

        let hierarchy = HierarchyConfig {
            train_highlevel_policy_freq: 0,
            ..Default::default()
        };
        assert!(hierarchy.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{"baseline_type": "simple", "batch_size": 8, "optimizer": "sgd"}"#;
        let config: TrainerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.baseline_type, BaselineType::Simple);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.critic_beta, 0.9);

        let bad = r#"{"baseline_type": "critic"}"#;
        assert!(serde_json::from_str::<TrainerConfig>(bad).is_err());
    }
}
