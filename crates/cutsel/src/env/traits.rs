//! Solver environment and cut-selection agent interfaces.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Information returned when a solver episode finishes.
///
/// Costs are reported negated so that larger is better.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EnvStepInfo {
    /// Negated wall-clock solving time of the episode
    pub solving_time: f64,
    /// Negated total number of branch-and-bound nodes
    pub ntotal_nodes: f64,
    /// Any further solver metrics (primal-dual integral, gap, ...)
    pub extra: BTreeMap<String, f64>,
}

impl EnvStepInfo {
    pub fn new(solving_time: f64, ntotal_nodes: f64) -> Self {
        Self {
            solving_time,
            ntotal_nodes,
            extra: BTreeMap::new(),
        }
    }

    /// Add a custom metric
    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Get a value by key (including the two required fields)
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "solving_time" => Some(self.solving_time),
            "ntotal_nodes" => Some(self.ntotal_nodes),
            _ => self.extra.get(key).copied(),
        }
    }
}

/// Callback the solver invokes at every separation round.
pub trait CutSelector {
    /// Choose which candidate cuts to add.
    ///
    /// `cut_features` is the `n_cuts x D` feature matrix of the candidates;
    /// the result holds row indices into it, in selection order.
    fn select_cuts(&mut self, cut_features: ArrayView2<'_, f32>) -> crate::Result<Vec<usize>>;
}

/// A solver instance that runs one episode per `step`.
///
/// Implementations wrap the MIP solver; this crate only drives them.
pub trait CutSelectEnv {
    /// Reload the problem instance and clear solver state.
    fn reset(&mut self) -> anyhow::Result<()>;

    /// Solve the instance, delegating cut selection to `agent`.
    fn step(&mut self, agent: &mut dyn CutSelector) -> anyhow::Result<EnvStepInfo>;
}
