//! Optimizer selection, gradient clipping and learning-rate scheduling.

use crate::{CutselError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "torch")]
use tch::{nn, nn::OptimizerConfig, Kind, Tensor};

/// Standard gradient-based optimizers available to the trainers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
    RmsProp,
}

impl OptimizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adam => "adam",
            Self::AdamW => "adamw",
            Self::Sgd => "sgd",
            Self::RmsProp => "rmsprop",
        }
    }

    /// Build an optimizer over every trainable variable of `vs`.
    #[cfg(feature = "torch")]
    pub fn build(&self, vs: &nn::VarStore, lr: f64) -> Result<TorchOptimizer> {
        let inner = match self {
            Self::Adam => nn::Adam::default().build(vs, lr)?,
            Self::AdamW => nn::AdamW::default().build(vs, lr)?,
            Self::Sgd => nn::Sgd::default().build(vs, lr)?,
            Self::RmsProp => nn::RmsProp::default().build(vs, lr)?,
        };
        Ok(TorchOptimizer::new(inner, vs.trainable_variables(), lr))
    }
}

impl FromStr for OptimizerKind {
    type Err = CutselError;

    /// Accepts the lowercase names as well as the `torch.optim` class names.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "adamw" => Ok(Self::AdamW),
            "sgd" => Ok(Self::Sgd),
            "rmsprop" => Ok(Self::RmsProp),
            _ => Err(CutselError::Config(format!(
                "unknown optimizer '{}' (expected one of: adam, adamw, sgd, rmsprop)",
                s
            ))),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrapper for Torch's nn::Optimizer that also tracks its variables and
/// current learning rate.
#[cfg(feature = "torch")]
pub struct TorchOptimizer {
    inner: nn::Optimizer,
    variables: Vec<Tensor>,
    lr: f64,
}

#[cfg(feature = "torch")]
impl TorchOptimizer {
    pub fn new(inner: nn::Optimizer, variables: Vec<Tensor>, lr: f64) -> Self {
        Self {
            inner,
            variables,
            lr,
        }
    }

    pub fn zero_grad(&mut self) {
        self.inner.zero_grad();
    }

    pub fn step(&mut self) {
        self.inner.step();
    }

    pub fn variables(&self) -> &[Tensor] {
        &self.variables
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
        self.inner.set_lr(lr);
    }

    /// Scale gradients so their global L2 norm is at most `max_norm`.
    ///
    /// Returns the norm before clipping.
    pub fn clip_grad_norm(&mut self, max_norm: f64) -> f64 {
        clip_grad_norm(&self.variables, max_norm)
    }

    /// zero_grad, backward, clip, step.
    ///
    /// Returns the pre-clip gradient norm, or None without touching the
    /// parameters when `loss` is not attached to the graph.
    pub fn backward_step(&mut self, loss: &Tensor, max_norm: f64) -> Option<f64> {
        if !loss.requires_grad() {
            return None;
        }
        self.zero_grad();
        loss.backward();
        let norm = self.clip_grad_norm(max_norm);
        self.step();
        Some(norm)
    }
}

/// Global L2 gradient clipping over `variables`; returns the pre-clip norm.
#[cfg(feature = "torch")]
pub fn clip_grad_norm(variables: &[Tensor], max_norm: f64) -> f64 {
    let mut global_norm = 0.0f64;
    for var in variables {
        let grad = var.grad();
        if grad.defined() {
            global_norm += grad
                .pow_tensor_scalar(2.0)
                .sum(Kind::Float)
                .double_value(&[]);
        }
    }
    global_norm = global_norm.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / (global_norm + 1e-6);
        for var in variables {
            let mut grad = var.grad();
            if grad.defined() {
                let _ = grad.f_mul_scalar_(clip_coef);
            }
        }
    }
    global_norm
}

/// Multiplies the learning rate by `gamma` every `step_size` scheduler steps.
#[derive(Clone, Debug, PartialEq)]
pub struct StepLr {
    base_lr: f64,
    step_size: u64,
    gamma: f64,
    last_epoch: u64,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: u64, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            last_epoch: 0,
        }
    }

    /// Learning rate after the steps taken so far.
    pub fn current_lr(&self) -> f64 {
        let decays = (self.last_epoch / self.step_size) as i32;
        self.base_lr * self.gamma.powi(decays)
    }

    /// Advance one step and return the new learning rate.
    pub fn advance(&mut self) -> f64 {
        self.last_epoch += 1;
        self.current_lr()
    }

    /// Advance and apply the new rate to `optimizer`.
    #[cfg(feature = "torch")]
    pub fn step(&mut self, optimizer: &mut TorchOptimizer) -> f64 {
        let lr = self.advance();
        optimizer.set_lr(lr);
        lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optimizer_names() {
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("adamw".parse::<OptimizerKind>().unwrap(), OptimizerKind::AdamW);
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!(
            "RMSprop".parse::<OptimizerKind>().unwrap(),
            OptimizerKind::RmsProp
        );
        assert!(matches!(
            "Adagrad".parse::<OptimizerKind>(),
            Err(CutselError::Config(_))
        ));
    }

    #[test]
    fn test_step_lr_schedule() {
        let mut sched = StepLr::new(1.0, 2, 0.5);
        assert_eq!(sched.current_lr(), 1.0);
        assert_eq!(sched.advance(), 1.0);
        assert_eq!(sched.advance(), 0.5);
        assert_eq!(sched.advance(), 0.5);
        assert_eq!(sched.advance(), 0.25);
    }

    #[cfg(feature = "torch")]
    #[test]
    fn test_clip_grad_norm() {
        use tch::{Device, Kind};

        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().ones("w", &[2]);
        let mut opt = OptimizerKind::Sgd.build(&vs, 0.1).unwrap();

        // d/dw sum(3w, 4w) = (3, 4), norm 5
        let loss = (&w * Tensor::from_slice(&[3.0f32, 4.0])).sum(Kind::Float);
        opt.zero_grad();
        loss.backward();
        let norm = opt.clip_grad_norm(1.0);

        assert!((norm - 5.0).abs() < 1e-5);
        let clipped: Vec<f32> = Vec::try_from(w.grad()).unwrap();
        assert!((clipped[0] - 0.6).abs() < 1e-4);
        assert!((clipped[1] - 0.8).abs() < 1e-4);
    }

    #[cfg(feature = "torch")]
    #[test]
    fn test_backward_step_skips_detached_loss() {
        use tch::{Device, Kind};

        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().ones("w", &[2]);
        let mut opt = OptimizerKind::Sgd.build(&vs, 0.5).unwrap();

        let detached = w.sum(Kind::Float).detach();
        assert!(opt.backward_step(&detached, 1.0).is_none());
        assert_eq!(Vec::<f32>::try_from(w.detach()).unwrap(), vec![1.0, 1.0]);

        let norm = opt.backward_step(&w.sum(Kind::Float), 10.0).unwrap();
        assert!((norm - 2f64.sqrt()).abs() < 1e-5);
        assert_eq!(Vec::<f32>::try_from(w.detach()).unwrap(), vec![0.5, 0.5]);
    }

    #[cfg(feature = "torch")]
    #[test]
    fn test_scheduler_updates_optimizer() {
        use tch::Device;

        let vs = nn::VarStore::new(Device::Cpu);
        let _w = vs.root().zeros("w", &[1]);
        let mut opt = OptimizerKind::Adam.build(&vs, 1e-3).unwrap();
        let mut sched = StepLr::new(opt.lr(), 1, 0.9);

        sched.step(&mut opt);
        assert!((opt.lr() - 9e-4).abs() < 1e-12);
    }
}
