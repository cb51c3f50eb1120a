//! Two-level training: the pointer policy every epoch, the cut-percentage
//! policy every `train_highlevel_policy_freq` epochs.

use super::aggregate::{check_state_dims, update_and_normalize};
use super::baseline::{compute_advantage, Baseline, EmaBaseline};
use super::buffer::HighLevelBuffer;
use super::config::{BaselineType, HierarchyConfig};
use super::optimizer::{StepLr, TorchOptimizer};
use super::reinforce::{mask_degenerate, minibatch_ranges, reinforce_loss, HIGH_LEVEL_LOGPROB_FLOOR};
use super::trainer::ReinforceTrainer;
use crate::checkpoint::CheckpointState;
use crate::data::EpisodeResult;
use crate::log::{create_stats, mean, Stats};
use crate::policy::{load_weights, save_weights, state_tensor, CutPercentPolicy, PointerPolicy};
use crate::Result;
use ndarray::Array2;
use std::collections::BTreeMap;
use tch::{Kind, Tensor};

const PREFIX: &str = "training_highlevel_policy";

/// Hierarchical REINFORCE trainer.
///
/// Wraps a [`ReinforceTrainer`] for the pointer policy and owns the
/// cut-percentage policy together with its own optimizer, LR schedule,
/// EMA baseline and sample buffer. The feature normalizer is shared.
pub struct HierarchicalTrainer<P: PointerPolicy, H: CutPercentPolicy> {
    low: ReinforceTrainer<P>,
    hierarchy: HierarchyConfig,
    cutsel_percent_net: H,
    optimizer: TorchOptimizer,
    lr_scheduler: Option<StepLr>,
    baseline: EmaBaseline,
    buffer: HighLevelBuffer,
    highlevel_epoch: u64,
}

impl<P: PointerPolicy, H: CutPercentPolicy> HierarchicalTrainer<P, H> {
    pub fn new(
        low: ReinforceTrainer<P>,
        cutsel_percent_net: H,
        hierarchy: HierarchyConfig,
    ) -> Result<Self> {
        hierarchy.validate()?;
        let config = low.config();
        let optimizer = config
            .optimizer
            .build(cutsel_percent_net.var_store(), hierarchy.highlevel_actor_lr)?;
        let lr_scheduler = config.lr_decay.enabled.then(|| {
            StepLr::new(
                hierarchy.highlevel_actor_lr,
                config.lr_decay.step,
                config.lr_decay.rate,
            )
        });
        let baseline = EmaBaseline::new(config.critic_beta);

        tracing::info!(
            freq = hierarchy.train_highlevel_policy_freq,
            batch_size = hierarchy.train_highlevel_batch_size,
            lr = hierarchy.highlevel_actor_lr,
            "hierarchical trainer ready"
        );

        Ok(Self {
            low,
            hierarchy,
            cutsel_percent_net,
            optimizer,
            lr_scheduler,
            baseline,
            buffer: HighLevelBuffer::new(),
            highlevel_epoch: 1,
        })
    }

    /// Low-level update, then a checkpoint holding both policies.
    pub fn train(&mut self, results: &[EpisodeResult], epoch: u64) -> Result<Stats> {
        let stats = self.low.update(results, epoch)?;
        let state = self.checkpoint_state(epoch)?;
        self.low.commit(epoch, &state, &stats)?;
        Ok(stats)
    }

    /// Buffer this call's high-level samples and, on epochs divisible by the
    /// configured frequency, update the cut-percentage policy on them.
    ///
    /// Returns empty stats on the other epochs.
    pub fn train_highlevel_policy(
        &mut self,
        results: &[EpisodeResult],
        epoch: u64,
    ) -> Result<Stats> {
        self.buffer
            .replace(results.iter().filter_map(|r| r.high_level.as_ref()))?;
        if epoch % self.hierarchy.train_highlevel_policy_freq != 0 {
            return Ok(Stats::new());
        }
        if self.buffer.is_empty() {
            tracing::warn!(epoch, "no high-level samples, skipping cut-percentage update");
            return Ok(Stats::new());
        }

        let stats = self.update_highlevel(epoch)?;
        self.highlevel_epoch += 1;
        self.buffer.clear();
        self.low.logger().record_dict(&stats, epoch);
        Ok(stats)
    }

    fn update_highlevel(&mut self, epoch: u64) -> Result<Stats> {
        let config = self.low.config().clone();
        let device = config.device;
        check_state_dims(
            self.buffer.states(),
            self.low.pointer_net().embedding_dim(),
        )?;

        let rewards: Vec<f64> = self
            .buffer
            .neg_rewards()
            .iter()
            .map(|r| r * config.reward_scale)
            .collect();
        let states: Vec<Array2<f32>> = match self.low.normalizer_mut() {
            Some(normalizer) => {
                update_and_normalize(normalizer, self.buffer.states(), None, epoch)?
            }
            None => self.buffer.states().to_vec(),
        };
        let actions = self.buffer.actions();

        let ema = self.baseline.update(mean(&rewards));
        tracing::debug!(highlevel_epoch = self.highlevel_epoch, ema, "high-level baseline updated");

        let mut log_probs_all = Vec::with_capacity(rewards.len());
        let mut info_all: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut masked = 0usize;
        let mut last_loss = 0.0;
        let mut last_advantage = 0.0;

        for range in minibatch_ranges(rewards.len(), self.hierarchy.train_highlevel_batch_size) {
            let mut log_probs = Vec::with_capacity(range.len());
            for idx in range.clone() {
                let state = state_tensor(&states[idx], device);
                let action = Tensor::from(actions[idx] as f32).to_device(device);
                let (log_prob, info) = self.cutsel_percent_net.log_prob(&state, &action);

                let (log_prob, kept) = mask_degenerate(&log_prob, HIGH_LEVEL_LOGPROB_FLOOR);
                let value = log_prob.double_value(&[]);
                if !kept {
                    tracing::warn!(
                        epoch,
                        sample = idx,
                        log_prob = value,
                        "high-level log-probability too small, sample excluded from the gradient"
                    );
                    masked += 1;
                }
                log_probs_all.push(value);
                log_probs.push(log_prob.reshape([1]));
                for (key, scalar) in info {
                    info_all
                        .entry(key)
                        .or_default()
                        .push(scalar.double_value(&[]));
                }
            }

            let log_probs = Tensor::cat(&log_probs, 0).reshape([-1, 1]);
            let batch_rewards: Vec<f32> =
                rewards[range.clone()].iter().map(|&r| r as f32).collect();
            let batch_rewards = Tensor::from_slice(&batch_rewards)
                .reshape([-1, 1])
                .to_device(device);
            let baseline = match config.baseline_type {
                BaselineType::Simple => Baseline::Scalar(ema),
                _ => Baseline::None,
            };
            let advantage = compute_advantage(&batch_rewards, baseline);
            let loss = reinforce_loss(&advantage, &log_probs);

            last_loss = loss.double_value(&[]);
            last_advantage = advantage.mean(Kind::Float).double_value(&[]);
            if self
                .optimizer
                .backward_step(&loss, config.max_grad_norm)
                .is_none()
            {
                tracing::warn!(
                    epoch,
                    samples = range.len(),
                    "every high-level sample was masked, skipping step"
                );
            }
        }

        if let Some(scheduler) = &mut self.lr_scheduler {
            let lr = scheduler.step(&mut self.optimizer);
            tracing::info!(epoch, lr, "cut-percentage policy lr decayed");
        }

        let mut stats = Stats::new();
        stats.extend(create_stats(&format!("{PREFIX}/Neg Reward"), &rewards));
        stats.extend(create_stats(&format!("{PREFIX}/logprobs"), &log_probs_all));
        stats.extend(create_stats(&format!("{PREFIX}/cut_percent_actions"), actions));
        stats.insert(format!("{PREFIX}/Neg Advantage"), last_advantage);
        stats.insert(format!("{PREFIX}/reinforce loss"), last_loss);
        stats.insert(format!("{PREFIX}/Critic Value"), ema);
        stats.insert(format!("{PREFIX}/masked samples"), masked as f64);
        stats.insert(format!("{PREFIX}/epoch"), self.highlevel_epoch as f64);
        for (key, values) in &info_all {
            stats.extend(create_stats(&format!("{PREFIX}/{key}"), values));
        }
        Ok(stats)
    }

    /// Both policies plus the normalizer.
    pub fn checkpoint_state(&self, epoch: u64) -> Result<CheckpointState> {
        Ok(self
            .low
            .checkpoint_state(epoch)?
            .with_cutsel_percent_net(save_weights(self.cutsel_percent_net.var_store())?))
    }

    pub fn load_checkpoint(&mut self, state: &CheckpointState) -> Result<()> {
        self.low.load_checkpoint(state)?;
        if let Some(weights) = &state.cutsel_percent_net {
            load_weights(self.cutsel_percent_net.var_store_mut(), weights)?;
        }
        Ok(())
    }

    pub fn low_level(&self) -> &ReinforceTrainer<P> {
        &self.low
    }

    pub fn low_level_mut(&mut self) -> &mut ReinforceTrainer<P> {
        &mut self.low
    }

    pub fn cutsel_percent_net(&self) -> &H {
        &self.cutsel_percent_net
    }

    pub fn buffer(&self) -> &HighLevelBuffer {
        &self.buffer
    }

    /// Number of high-level updates performed so far, plus one.
    pub fn highlevel_epoch(&self) -> u64 {
        self.highlevel_epoch
    }

    pub fn highlevel_baseline(&self) -> &EmaBaseline {
        &self.baseline
    }
}
