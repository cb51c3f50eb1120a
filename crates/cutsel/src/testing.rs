//! Small linear models implementing the collaborator traits, for unit tests.

use crate::data::{EpisodeInfo, EpisodeResult, HighLevelDataset, LowLevelDataset};
use crate::policy::{CutPercentPolicy, HasVarStore, PointerOutput, PointerPolicy, ValueModel};
use crate::training::DecodeType;
use ndarray::Array2;
use std::collections::BTreeMap;
use tch::{nn, Device, Kind, Tensor};

const MASKED: f64 = -1e9;

/// Scores each cut with a dot product and selects without replacement.
pub struct LinearPointer {
    vs: nn::VarStore,
    w: Tensor,
    dim: usize,
}

impl LinearPointer {
    pub fn new(dim: usize) -> Self {
        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().ones("w", &[dim as i64]);
        Self { vs, w, dim }
    }

    pub fn weights(&self) -> Vec<f32> {
        Vec::try_from(self.w.detach()).unwrap()
    }

    fn scores(&self, state: &Tensor) -> Tensor {
        let n = state.size()[0];
        state.reshape([n, self.dim as i64]).mv(&self.w)
    }
}

impl HasVarStore for LinearPointer {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl PointerPolicy for LinearPointer {
    fn embedding_dim(&self) -> usize {
        self.dim
    }

    fn logprobs(&self, state: &Tensor, _sel_cuts_num: usize, action: &[i64]) -> PointerOutput {
        let scores = self.scores(state);
        let mut mask = Tensor::zeros_like(&scores);
        let mut position_probs = Vec::with_capacity(action.len());
        let mut log_prob = Tensor::from(0.0f32).to_device(scores.device());
        for &a in action {
            let log_p = (&scores + &mask).log_softmax(0, Kind::Float);
            position_probs.push(log_p.exp());
            log_prob = log_prob + log_p.get(a);
            mask = mask.index_fill(0, &Tensor::from_slice(&[a]), MASKED);
        }
        PointerOutput {
            position_probs,
            log_prob,
        }
    }

    fn decode(&self, state: &Tensor, sel_cuts_num: usize, decode_type: DecodeType) -> Vec<i64> {
        let scores = self.scores(state).detach();
        let mut mask = Tensor::zeros_like(&scores);
        let mut picked = Vec::with_capacity(sel_cuts_num);
        for _ in 0..sel_cuts_num {
            let logits = &scores + &mask;
            let idx = match decode_type {
                DecodeType::Greedy => logits.argmax(0, false).int64_value(&[]),
                DecodeType::Stochastic => logits
                    .softmax(0, Kind::Float)
                    .multinomial(1, false)
                    .int64_value(&[0]),
            };
            picked.push(idx);
            mask = mask.index_fill(0, &Tensor::from_slice(&[idx]), MASKED);
        }
        picked
    }
}

/// Mean of linear cut scores.
pub struct LinearValue {
    vs: nn::VarStore,
    w: Tensor,
    dim: usize,
}

impl LinearValue {
    pub fn new(dim: usize) -> Self {
        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().zeros("w", &[dim as i64]);
        Self { vs, w, dim }
    }
}

impl HasVarStore for LinearValue {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl ValueModel for LinearValue {
    fn forward(&self, state: &Tensor) -> Tensor {
        let n = state.size()[0];
        state
            .reshape([n, self.dim as i64])
            .mv(&self.w)
            .mean(Kind::Float)
    }
}

/// Gaussian over the kept fraction with a learned mean.
pub struct GaussianPercent {
    vs: nn::VarStore,
    w: Tensor,
    dim: usize,
}

impl GaussianPercent {
    pub const STD: f64 = 0.1;

    pub fn new(dim: usize) -> Self {
        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().zeros("w", &[dim as i64]);
        Self { vs, w, dim }
    }

    pub fn weights(&self) -> Vec<f32> {
        Vec::try_from(self.w.detach()).unwrap()
    }
}

impl HasVarStore for GaussianPercent {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl CutPercentPolicy for GaussianPercent {
    fn log_prob(&self, state: &Tensor, action: &Tensor) -> (Tensor, BTreeMap<String, Tensor>) {
        let n = state.size()[0];
        let pooled = state
            .reshape([n, self.dim as i64])
            .mean_dim(Some(&[0i64][..]), false, Kind::Float);
        let mu = pooled.dot(&self.w).sigmoid();
        let z = (action - &mu) / Self::STD;
        let log_prob = -(&z * &z) / 2.0 - (Self::STD * (2.0 * std::f64::consts::PI).sqrt()).ln();

        let mut info = BTreeMap::new();
        info.insert("mu".to_string(), mu.detach());
        (log_prob, info)
    }
}

/// Deterministic `n_cuts x dim` feature matrix.
pub fn features(n_cuts: usize, dim: usize, offset: f32) -> Array2<f32> {
    Array2::from_shape_fn((n_cuts, dim), |(c, d)| {
        ((c * dim + d) as f32 * 0.1).sin() + offset
    })
}

/// One episode with `rewards.len()` low-level samples and one high-level sample.
pub fn episode(rewards: &[f64], dim: usize) -> EpisodeResult {
    let mut low = LowLevelDataset::default();
    for (i, r) in rewards.iter().enumerate() {
        let n_cuts = 3 + i % 3;
        low.push(features(n_cuts, dim, i as f32 * 0.05), vec![0, 2], 2, *r);
    }
    let mut high = HighLevelDataset::default();
    let mean_reward = rewards.iter().sum::<f64>() / rewards.len().max(1) as f64;
    high.push(features(4, dim, 0.3), 0.4, mean_reward);

    let mut info = EpisodeInfo::new();
    info.insert("solving_time".to_string(), vec![-mean_reward]);
    info.insert("ntotal_nodes".to_string(), vec![10.0]);
    EpisodeResult::new(info, low).with_high_level(high)
}
