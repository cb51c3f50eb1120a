//! Policy-driven cut selection during rollouts, and evaluation runs.

use super::stats::{evaluation_stats, EvaluationResult};
use crate::data::LowLevelDataset;
use crate::env::{CutSelectEnv, CutSelector};
use crate::log::{mean, MetricLogger, Stats};
use crate::normalizer::RunningMeanStd;
use crate::policy::{state_tensor, PointerPolicy};
use crate::training::{DecodeType, TrainerConfig};
use crate::{CutselError, Result};
use ndarray::ArrayView2;
use tch::Device;

/// Cut selector backed by a pointer policy.
///
/// Keeps `max(1, ceil(sel_cuts_percent * n_cuts))` cuts per separation
/// round. When a normalizer is attached, features are standardized before
/// they reach the policy.
pub struct CutSelectAgent<'a, P: PointerPolicy> {
    policy: &'a P,
    decode_type: DecodeType,
    sel_cuts_percent: f64,
    normalizer: Option<&'a RunningMeanStd>,
    device: Device,
    trajectory: Option<LowLevelDataset>,
}

impl<'a, P: PointerPolicy> CutSelectAgent<'a, P> {
    pub fn new(
        policy: &'a P,
        decode_type: DecodeType,
        sel_cuts_percent: f64,
        normalizer: Option<&'a RunningMeanStd>,
        device: Device,
    ) -> Self {
        Self {
            policy,
            decode_type,
            sel_cuts_percent,
            normalizer,
            device,
            trajectory: None,
        }
    }

    /// Keep every decision as a training sample.
    pub fn recording(mut self) -> Self {
        self.trajectory = Some(LowLevelDataset::default());
        self
    }

    pub fn decode_type(&self) -> DecodeType {
        self.decode_type
    }

    /// Number of cuts kept out of `n_cuts` candidates.
    pub fn sel_cuts_num(&self, n_cuts: usize) -> usize {
        let k = (self.sel_cuts_percent * n_cuts as f64).ceil() as usize;
        k.clamp(1, n_cuts.max(1))
    }

    /// Recorded decisions, all credited with the episode's `neg_reward`.
    ///
    /// States are the raw features; the trainer normalizes them itself.
    pub fn into_trajectory(self, neg_reward: f64) -> Option<LowLevelDataset> {
        self.trajectory.map(|mut data| {
            data.neg_rewards.iter_mut().for_each(|r| *r = neg_reward);
            data
        })
    }
}

impl<P: PointerPolicy> CutSelector for CutSelectAgent<'_, P> {
    fn select_cuts(&mut self, cut_features: ArrayView2<'_, f32>) -> Result<Vec<usize>> {
        let n_cuts = cut_features.nrows();
        if n_cuts == 0 {
            return Ok(Vec::new());
        }
        let dim = self.policy.embedding_dim();
        if cut_features.ncols() != dim {
            return Err(CutselError::ShapeMismatch {
                expected: vec![n_cuts, dim],
                actual: vec![n_cuts, cut_features.ncols()],
            });
        }

        let sel_cuts_num = self.sel_cuts_num(n_cuts);
        let state = match self.normalizer {
            Some(normalizer) => normalizer.normalize(cut_features)?,
            None => cut_features.to_owned(),
        };
        let action = tch::no_grad(|| {
            self.policy.decode(
                &state_tensor(&state, self.device),
                sel_cuts_num,
                self.decode_type,
            )
        });

        let selected = action
            .iter()
            .map(|&a| {
                usize::try_from(a)
                    .ok()
                    .filter(|&i| i < n_cuts)
                    .ok_or_else(|| {
                        CutselError::TrainingError(format!(
                            "policy selected cut {a} out of {n_cuts} candidates"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(trajectory) = &mut self.trajectory {
            trajectory.push(cut_features.to_owned(), action, sel_cuts_num, 0.0);
        }
        Ok(selected)
    }
}

/// Runs evaluation rollouts with the evaluation decode type.
pub struct Evaluator<'a, P: PointerPolicy> {
    policy: &'a P,
    normalizer: Option<&'a RunningMeanStd>,
    config: &'a TrainerConfig,
    logger: &'a dyn MetricLogger,
}

impl<'a, P: PointerPolicy> Evaluator<'a, P> {
    pub fn new(
        policy: &'a P,
        normalizer: Option<&'a RunningMeanStd>,
        config: &'a TrainerConfig,
        logger: &'a dyn MetricLogger,
    ) -> Self {
        Self {
            policy,
            normalizer,
            config,
            logger,
        }
    }

    /// `evaluate_samples` rollouts, each on a freshly reset environment with
    /// a fresh agent. Records and returns the mean negated solving time and
    /// node count.
    pub fn evaluate<E: CutSelectEnv + ?Sized>(&self, env: &mut E, epoch: u64) -> Result<Stats> {
        tracing::info!(epoch, samples = self.config.evaluate_samples, "evaluating");

        let mut results = Vec::with_capacity(self.config.evaluate_samples);
        for _ in 0..self.config.evaluate_samples {
            env.reset()?;
            let mut agent = CutSelectAgent::new(
                self.policy,
                self.config.evaluate_decode_type,
                self.config.sel_cuts_percent,
                self.normalizer,
                self.config.device,
            );
            let info = env.step(&mut agent)?;
            results.push(EvaluationResult::from_step_info(&info));
        }

        let solving_time: Vec<f64> = results.iter().map(|r| r.neg_solving_time).collect();
        let total_nodes: Vec<f64> = results.iter().map(|r| r.neg_total_nodes).collect();

        let mut stats = Stats::new();
        stats.insert("evaluating/Neg Solving time".to_string(), mean(&solving_time));
        stats.insert("evaluating/Neg Total Nodes".to_string(), mean(&total_nodes));
        for (name, value) in &stats {
            self.logger.record_tabular(name, *value, epoch);
        }
        Ok(stats)
    }

    /// Summary statistics over externally collected evaluation results.
    pub fn log_evaluate_stats(&self, results: &[EvaluationResult]) -> Stats {
        evaluation_stats(results, self.config.reward_type)
    }
}
