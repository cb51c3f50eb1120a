//! REINFORCE trainer for the pointer (cut-ranking) policy.

use super::aggregate::{per_feature_stats, stack_states, TrajectoryAggregator};
use super::baseline::{compute_advantage, Baseline, EmaBaseline};
use super::config::{BaselineType, DecodeType, TrainerConfig};
use super::optimizer::{StepLr, TorchOptimizer};
use super::reinforce::{
    critic_loss, mask_degenerate, minibatch_ranges, reinforce_loss, softmax_entropy,
    LOW_LEVEL_LOGPROB_FLOOR,
};
use crate::checkpoint::{CheckpointSink, CheckpointState};
use crate::data::{EpisodeResult, TrainingBatch};
use crate::env::CutSelectEnv;
use crate::eval::{CutSelectAgent, Evaluator};
use crate::log::{create_stats, mean, MetricLogger, Stats};
use crate::normalizer::RunningMeanStd;
use crate::policy::{load_weights, save_weights, state_tensor, PointerPolicy, ValueModel};
use crate::{CutselError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::ops::Range;
use std::sync::Arc;
use tch::{Kind, Tensor};

/// What one mini-batch update produced.
#[derive(Default)]
struct MinibatchOutcome {
    log_probs: Vec<f64>,
    loss: f64,
    advantage: f64,
    grad_norm: Option<f64>,
    critic_value: Option<f64>,
    critic_loss: Option<f64>,
    entropy: Option<f64>,
    masked: usize,
}

/// Policy-gradient trainer for a [`PointerPolicy`].
///
/// One [`train`](Self::train) call consumes the rollouts of one epoch:
/// aggregate, update over mini-batches, step the LR schedule, checkpoint and
/// record statistics.
pub struct ReinforceTrainer<P: PointerPolicy> {
    config: TrainerConfig,
    pointer_net: P,
    value_net: Option<Box<dyn ValueModel>>,
    policy_optimizer: TorchOptimizer,
    value_optimizer: Option<TorchOptimizer>,
    lr_scheduler: Option<StepLr>,
    baseline: EmaBaseline,
    normalizer: Option<RunningMeanStd>,
    aggregator: TrajectoryAggregator,
    logger: Arc<dyn MetricLogger>,
    checkpoint_sink: Box<dyn CheckpointSink>,
}

impl<P: PointerPolicy> ReinforceTrainer<P> {
    /// Build a trainer around `pointer_net`.
    ///
    /// `value_net` is required for the `net` baseline and ignored otherwise.
    pub fn new(
        pointer_net: P,
        value_net: Option<Box<dyn ValueModel>>,
        config: TrainerConfig,
        logger: Arc<dyn MetricLogger>,
        checkpoint_sink: Box<dyn CheckpointSink>,
    ) -> Result<Self> {
        config.validate()?;

        let value_net = match (config.baseline_type, value_net) {
            (BaselineType::Net, None) => {
                return Err(CutselError::Config(
                    "baseline_type 'net' requires a value model".into(),
                ))
            }
            (BaselineType::Net, Some(net)) => Some(net),
            (_, _) => None,
        };

        let policy_optimizer = config
            .optimizer
            .build(pointer_net.var_store(), config.actor_lr)?;
        let value_optimizer = match &value_net {
            Some(net) => Some(config.optimizer.build(net.var_store(), config.critic_lr)?),
            None => None,
        };
        let lr_scheduler = config
            .lr_decay
            .enabled
            .then(|| StepLr::new(config.actor_lr, config.lr_decay.step, config.lr_decay.rate));
        let normalizer = config
            .normalize
            .then(|| RunningMeanStd::new(pointer_net.embedding_dim()));

        tracing::info!(
            optimizer = %config.optimizer,
            baseline = %config.baseline_type,
            batch_size = config.batch_size,
            normalize = config.normalize,
            "reinforce trainer ready"
        );

        Ok(Self {
            baseline: EmaBaseline::new(config.critic_beta),
            aggregator: TrajectoryAggregator::from_config(&config)
                .with_state_dim(pointer_net.embedding_dim()),
            config,
            pointer_net,
            value_net,
            policy_optimizer,
            value_optimizer,
            lr_scheduler,
            normalizer,
            logger,
            checkpoint_sink,
        })
    }

    /// Update on one epoch of rollouts, checkpoint, and record statistics.
    pub fn train(&mut self, results: &[EpisodeResult], epoch: u64) -> Result<Stats> {
        let stats = self.update(results, epoch)?;
        let state = self.checkpoint_state(epoch)?;
        self.commit(epoch, &state, &stats)?;
        Ok(stats)
    }

    /// Gradient updates only; no checkpoint and no `record_dict`.
    pub(crate) fn update(&mut self, results: &[EpisodeResult], epoch: u64) -> Result<Stats> {
        let logger = Arc::clone(&self.logger);
        let batch = self
            .aggregator
            .aggregate(results, self.normalizer.as_mut(), logger.as_ref(), epoch)?;
        let rewards = batch.rewards();

        if self.config.baseline_type == BaselineType::Simple {
            let ema = self.baseline.update(mean(&rewards));
            tracing::debug!(epoch, ema, "baseline updated");
        }

        let ranges = minibatch_ranges(batch.len(), self.config.batch_size);
        let progress = self.progress_bar(ranges.len() as u64);
        let mut outcomes = Vec::with_capacity(ranges.len());
        for (loop_idx, range) in ranges.iter().enumerate() {
            tracing::debug!(epoch, loop_idx, loops = ranges.len(), "training loop");
            let outcome = self.train_minibatch(&batch, range.clone(), epoch, loop_idx == 0)?;
            progress.set_message(format!("loss: {:.4}", outcome.loss));
            progress.inc(1);
            outcomes.push(outcome);
        }
        progress.finish_and_clear();

        if let Some(scheduler) = &mut self.lr_scheduler {
            let lr = scheduler.step(&mut self.policy_optimizer);
            tracing::info!(epoch, lr, "pointer policy lr decayed");
        }

        self.epoch_stats(&batch, &rewards, &outcomes, epoch)
    }

    fn train_minibatch(
        &mut self,
        batch: &TrainingBatch,
        range: Range<usize>,
        epoch: u64,
        log_first: bool,
    ) -> Result<MinibatchOutcome> {
        let device = self.config.device;
        let mut outcome = MinibatchOutcome::default();
        let mut log_probs = Vec::with_capacity(range.len());
        let mut values = Vec::new();
        let mut first_position = None;

        for idx in range.clone() {
            let state = state_tensor(&batch.states[idx], device);
            let action = &batch.actions[idx];
            let out = self
                .pointer_net
                .logprobs(&state, batch.sel_cuts_nums[idx], action);

            let (log_prob, kept) = mask_degenerate(&out.log_prob, LOW_LEVEL_LOGPROB_FLOOR);
            let value = log_prob.double_value(&[]);
            if !kept {
                tracing::warn!(
                    epoch,
                    sample = idx,
                    log_prob = value,
                    "log-probability too small, sample excluded from the gradient"
                );
                outcome.masked += 1;
            }
            outcome.log_probs.push(value);
            log_probs.push(log_prob.reshape([1]));

            if let Some(value_net) = &self.value_net {
                values.push(value_net.forward(&state).reshape([1]));
            }

            if log_first && idx == range.start {
                self.log_first_sample(action, &out.position_probs, epoch)?;
            }
            first_position = out.position_probs.first().map(Tensor::detach);
        }
        outcome.entropy = first_position.map(|probs| softmax_entropy(&probs).double_value(&[]));

        let log_probs = Tensor::cat(&log_probs, 0).reshape([-1, 1]);
        let rewards: Vec<f32> = range
            .clone()
            .map(|i| batch.neg_rewards[[i, 0]] as f32)
            .collect();
        let rewards = Tensor::from_slice(&rewards)
            .reshape([-1, 1])
            .to_device(device);
        let values = (!values.is_empty()).then(|| Tensor::cat(&values, 0).reshape([-1, 1]));

        let baseline = match (&values, self.config.baseline_type) {
            (Some(values), _) => Baseline::Values(values),
            (None, BaselineType::Simple) => Baseline::Scalar(self.baseline.value().unwrap_or(0.0)),
            (None, _) => Baseline::None,
        };
        let advantage = compute_advantage(&rewards, baseline);
        let loss = reinforce_loss(&advantage, &log_probs);

        outcome.loss = loss.double_value(&[]);
        outcome.advantage = advantage.mean(Kind::Float).double_value(&[]);
        outcome.grad_norm = self
            .policy_optimizer
            .backward_step(&loss, self.config.max_grad_norm);
        if outcome.grad_norm.is_none() {
            tracing::warn!(
                epoch,
                samples = range.len(),
                "every sample of the mini-batch was masked, skipping policy step"
            );
        }

        if let (Some(values), Some(optimizer)) = (&values, &mut self.value_optimizer) {
            let critic = critic_loss(values, &rewards);
            outcome.critic_loss = Some(critic.double_value(&[]));
            outcome.critic_value = Some(values.mean(Kind::Float).double_value(&[]));
            optimizer.backward_step(&critic, self.config.max_grad_norm);
        }

        tracing::debug!(
            epoch,
            loss = outcome.loss,
            grad_norm = ?outcome.grad_norm,
            masked = outcome.masked,
            "mini-batch updated"
        );
        Ok(outcome)
    }

    fn log_first_sample(
        &self,
        action: &[i64],
        position_probs: &[Tensor],
        epoch: u64,
    ) -> Result<()> {
        let selected: Vec<f64> = action.iter().map(|&a| a as f64).collect();
        self.logger
            .add_histogram("pointer_net/selected_idxes", &selected, epoch);
        for (pos, probs) in position_probs.iter().enumerate() {
            let probs = Vec::<f64>::try_from(probs.detach().to_kind(Kind::Double).flatten(0, -1))?;
            self.logger
                .add_histogram(&format!("pointer_net/probs_pos_{}", pos + 1), &probs, epoch);
        }
        Ok(())
    }

    fn epoch_stats(
        &self,
        batch: &TrainingBatch,
        rewards: &[f64],
        outcomes: &[MinibatchOutcome],
        epoch: u64,
    ) -> Result<Stats> {
        self.logger.add_histogram("neg_rewards", rewards, epoch);

        let mut stats = Stats::new();
        stats.insert("Epoch".to_string(), epoch as f64);
        stats.extend(create_stats("training/Neg Reward", rewards));

        let log_probs: Vec<f64> = outcomes
            .iter()
            .flat_map(|o| o.log_probs.iter().copied())
            .collect();
        stats.extend(create_stats("training/logprobs", &log_probs));

        // last mini-batch
        if let Some(last) = outcomes.last() {
            stats.insert("training/Neg Advantage".to_string(), last.advantage);
            stats.insert("training/reinforce loss".to_string(), last.loss);
            if let Some(norm) = last.grad_norm {
                stats.insert("training/grad norm".to_string(), norm);
            }
            if let Some(entropy) = last.entropy {
                stats.insert("training/pos_1_entropy".to_string(), entropy);
            }
            if let Some(critic_loss) = last.critic_loss {
                stats.insert("training/Critic Loss".to_string(), critic_loss);
            }
            if let Some(value) = last.critic_value {
                stats.insert("training/Critic Value".to_string(), value);
            }
        }
        if self.config.baseline_type == BaselineType::Simple {
            if let Some(ema) = self.baseline.value() {
                stats.insert("training/Critic Value".to_string(), ema);
            }
        }

        if let Some(norm) = &batch.reward_normalization {
            stats.insert("training/reward norm mean".to_string(), norm.mean);
            stats.insert("training/reward norm std".to_string(), norm.std);
        }

        let masked: usize = outcomes.iter().map(|o| o.masked).sum();
        stats.insert("training/masked samples".to_string(), masked as f64);
        stats.insert("training/policy lr".to_string(), self.policy_optimizer.lr());

        stats.extend(create_stats("training/len cuts", &batch.cut_counts()));
        let sel_cuts: Vec<f64> = batch.sel_cuts_nums.iter().map(|&n| n as f64).collect();
        stats.extend(create_stats("training/sel cuts num", &sel_cuts));

        let stacked = stack_states(&batch.states)?;
        stats.extend(per_feature_stats(stacked.view(), |i| {
            format!("training/cut {i} th feature")
        }));

        for (key, values) in &batch.episode_info {
            stats.extend(create_stats(&format!("training/{key}"), values));
        }
        Ok(stats)
    }

    /// Persist `state` and record `stats`.
    pub(crate) fn commit(
        &mut self,
        epoch: u64,
        state: &CheckpointState,
        stats: &Stats,
    ) -> Result<()> {
        self.checkpoint_sink.save(epoch, state)?;
        tracing::info!(epoch, components = ?state.components(), "checkpoint saved");
        self.logger.record_dict(stats, epoch);
        Ok(())
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    /// Pointer weights and normalizer statistics at `epoch`.
    pub fn checkpoint_state(&self, epoch: u64) -> Result<CheckpointState> {
        let mut state = CheckpointState::new(epoch, save_weights(self.pointer_net.var_store())?);
        if let Some(normalizer) = &self.normalizer {
            state = state.with_normalizer(normalizer.snapshot());
        }
        Ok(state)
    }

    /// Restore pointer weights and, when present, the normalizer.
    pub fn load_checkpoint(&mut self, state: &CheckpointState) -> Result<()> {
        tracing::info!(epoch = state.epoch, version = %state.version, "loading checkpoint");
        load_weights(self.pointer_net.var_store_mut(), &state.pointer_net)?;
        if let Some(snapshot) = &state.normalizer {
            let normalizer = RunningMeanStd::from_snapshot(snapshot)?;
            if normalizer.dim() != self.pointer_net.embedding_dim() {
                return Err(CutselError::ShapeMismatch {
                    expected: vec![self.pointer_net.embedding_dim()],
                    actual: vec![normalizer.dim()],
                });
            }
            self.normalizer = Some(normalizer);
        }
        Ok(())
    }

    /// Agent for collecting training rollouts.
    pub fn train_agent(&self) -> CutSelectAgent<'_, P> {
        self.agent(self.config.train_decode_type)
    }

    pub fn agent(&self, decode_type: DecodeType) -> CutSelectAgent<'_, P> {
        CutSelectAgent::new(
            &self.pointer_net,
            decode_type,
            self.config.sel_cuts_percent,
            self.normalizer.as_ref(),
            self.config.device,
        )
    }

    pub fn evaluator(&self) -> Evaluator<'_, P> {
        Evaluator::new(
            &self.pointer_net,
            self.normalizer.as_ref(),
            &self.config,
            self.logger.as_ref(),
        )
    }

    /// Policy-only rollouts with the evaluation decode type.
    pub fn evaluate<E: CutSelectEnv + ?Sized>(&self, env: &mut E, epoch: u64) -> Result<Stats> {
        self.evaluator().evaluate(env, epoch)
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn pointer_net(&self) -> &P {
        &self.pointer_net
    }

    pub fn pointer_net_mut(&mut self) -> &mut P {
        &mut self.pointer_net
    }

    pub fn value_net(&self) -> Option<&dyn ValueModel> {
        self.value_net.as_deref()
    }

    pub fn normalizer(&self) -> Option<&RunningMeanStd> {
        self.normalizer.as_ref()
    }

    pub(crate) fn normalizer_mut(&mut self) -> Option<&mut RunningMeanStd> {
        self.normalizer.as_mut()
    }

    pub fn baseline(&self) -> &EmaBaseline {
        &self.baseline
    }

    pub fn policy_lr(&self) -> f64 {
        self.policy_optimizer.lr()
    }

    pub fn logger(&self) -> &Arc<dyn MetricLogger> {
        &self.logger
    }
}
